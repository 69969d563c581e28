//! Columnar geospatial table.
//!
//! A `GeoTable` holds one geometry column, one id column and any number of
//! attribute columns. Every column has exactly one entry per row; attributes
//! missing from a source feature are stored as [`AttributeValue::Null`].

use geo_types::Geometry;
use std::collections::{BTreeMap, BTreeSet};

use super::{AttributeValue, Feature, FeatureCollection};
use crate::error::{Error, Result};

/// Table of features with a dedicated geometry column.
#[derive(Debug, Clone, Default)]
pub struct GeoTable {
    geometry: Vec<Option<Geometry<f64>>>,
    ids: Vec<Option<String>>,
    columns: BTreeMap<String, Vec<AttributeValue>>,
}

impl GeoTable {
    /// Build a table from features.
    ///
    /// The column set is the union of all property keys; column order is
    /// lexicographic.
    pub fn from_features<I>(features: I) -> Self
    where
        I: IntoIterator<Item = Feature>,
    {
        let features: Vec<Feature> = features.into_iter().collect();
        let n = features.len();

        let keys: BTreeSet<String> = features
            .iter()
            .flat_map(|f| f.properties.keys().cloned())
            .collect();

        let mut columns: BTreeMap<String, Vec<AttributeValue>> = keys
            .into_iter()
            .map(|k| (k, Vec::with_capacity(n)))
            .collect();

        let mut geometry = Vec::with_capacity(n);
        let mut ids = Vec::with_capacity(n);

        for mut feature in features {
            for (key, column) in columns.iter_mut() {
                column.push(feature.properties.remove(key).unwrap_or(AttributeValue::Null));
            }
            geometry.push(feature.geometry);
            ids.push(feature.id);
        }

        Self {
            geometry,
            ids,
            columns,
        }
    }

    /// Build a table from a GeoJSON `FeatureCollection` value.
    pub fn from_geojson(value: serde_json::Value) -> Result<Self> {
        Ok(Self::from_features(FeatureCollection::from_geojson_value(value)?))
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.geometry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geometry.is_empty()
    }

    /// Attribute column names, in order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Borrow an attribute column.
    pub fn column(&self, name: &str) -> Option<&[AttributeValue]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// The geometry column.
    pub fn geometry(&self) -> &[Option<Geometry<f64>>] {
        &self.geometry
    }

    /// Feature ids, one per row.
    pub fn ids(&self) -> &[Option<String>] {
        &self.ids
    }

    /// Single cell lookup.
    pub fn value(&self, column: &str, row: usize) -> Result<&AttributeValue> {
        let col = self
            .columns
            .get(column)
            .ok_or_else(|| Error::MissingColumn(column.to_string()))?;
        col.get(row).ok_or(Error::RowOutOfBounds {
            row,
            len: self.len(),
        })
    }

    /// Replace every value of a column, row by row.
    ///
    /// The closure receives the row index and the current value. On error
    /// the column is left unchanged.
    pub fn try_map_column<F, E>(&mut self, name: &str, mut f: F) -> std::result::Result<(), E>
    where
        F: FnMut(usize, &AttributeValue) -> std::result::Result<AttributeValue, E>,
        E: From<Error>,
    {
        let column = self
            .columns
            .get_mut(name)
            .ok_or_else(|| Error::MissingColumn(name.to_string()))?;

        let mapped = column
            .iter()
            .enumerate()
            .map(|(row, v)| f(row, v))
            .collect::<std::result::Result<Vec<_>, E>>()?;

        *column = mapped;
        Ok(())
    }

    /// Insert or replace a column. The column must have one value per row.
    pub fn set_column(
        &mut self,
        name: impl Into<String>,
        values: Vec<AttributeValue>,
    ) -> Result<()> {
        if values.len() != self.len() {
            return Err(Error::Other(format!(
                "column length {} does not match table length {}",
                values.len(),
                self.len()
            )));
        }
        self.columns.insert(name.into(), values);
        Ok(())
    }

    /// Row indices grouped by the string value of `column`.
    ///
    /// Null rows are skipped; any other non-string value is an error.
    pub fn group_rows(&self, column: &str) -> Result<BTreeMap<String, Vec<usize>>> {
        let col = self
            .columns
            .get(column)
            .ok_or_else(|| Error::MissingColumn(column.to_string()))?;

        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (row, value) in col.iter().enumerate() {
            match value {
                AttributeValue::String(key) => groups.entry(key.clone()).or_default().push(row),
                AttributeValue::Null => {}
                other => {
                    return Err(Error::ColumnType {
                        column: column.to_string(),
                        row,
                        expected: "string",
                        actual: other.type_name(),
                    })
                }
            }
        }
        Ok(groups)
    }

    /// Materialize row `row` as a feature. Null attributes are omitted.
    pub fn feature(&self, row: usize) -> Result<Feature> {
        if row >= self.len() {
            return Err(Error::RowOutOfBounds {
                row,
                len: self.len(),
            });
        }

        let mut feature = match &self.geometry[row] {
            Some(g) => Feature::new(g.clone()),
            None => Feature::empty(),
        };
        feature.id = self.ids[row].clone();
        for (name, column) in &self.columns {
            if !column[row].is_null() {
                feature.set_property(name.clone(), column[row].clone());
            }
        }
        Ok(feature)
    }

    /// Export as a GeoJSON `FeatureCollection` value.
    pub fn to_geojson(&self) -> Result<serde_json::Value> {
        let features = (0..self.len())
            .map(|row| self.feature(row).map(|f| f.to_geojson()))
            .collect::<Result<Vec<_>>>()?;

        let fc = geojson::FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        };
        Ok(serde_json::to_value(&fc)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::point;
    use serde_json::json;

    fn sample() -> GeoTable {
        let mut a = Feature::new(Geometry::Point(point!(x: 1.0, y: 2.0))).with_id("a");
        a.set_property("group_id", "102_34.57");
        a.set_property("orbit", 102i64);

        let mut b = Feature::empty().with_id("b");
        b.set_property("group_id", "102_34.57");
        b.set_property("mode", "IW");

        let mut c = Feature::empty().with_id("c");
        c.set_property("group_id", "9_-1.00");

        GeoTable::from_features(vec![a, b, c])
    }

    #[test]
    fn columns_are_union_of_properties() {
        let table = sample();
        assert_eq!(table.len(), 3);
        let names: Vec<&str> = table.column_names().collect();
        assert_eq!(names, vec!["group_id", "mode", "orbit"]);
        assert_eq!(table.value("mode", 0).unwrap(), &AttributeValue::Null);
        assert_eq!(table.value("mode", 1).unwrap(), &AttributeValue::from("IW"));
        assert!(table.geometry()[0].is_some());
        assert!(table.geometry()[1].is_none());
        assert_eq!(table.ids()[2].as_deref(), Some("c"));
    }

    #[test]
    fn missing_column_and_row_are_errors() {
        let table = sample();
        assert!(matches!(table.value("nope", 0), Err(Error::MissingColumn(_))));
        assert!(matches!(
            table.value("orbit", 3),
            Err(Error::RowOutOfBounds { row: 3, len: 3 })
        ));
    }

    #[test]
    fn try_map_column_is_all_or_nothing() {
        let mut table = sample();
        let res: Result<()> = table.try_map_column("orbit", |row, v| {
            if row == 2 {
                Err(Error::Other("boom".into()))
            } else {
                Ok(v.clone())
            }
        });
        assert!(res.is_err());
        assert_eq!(table.value("orbit", 0).unwrap(), &AttributeValue::Int(102));

        table
            .try_map_column::<_, Error>("orbit", |_, v| Ok(AttributeValue::from(v.is_null())))
            .unwrap();
        assert_eq!(table.value("orbit", 1).unwrap(), &AttributeValue::Bool(true));
    }

    #[test]
    fn group_rows_clusters_by_value() {
        let groups = sample().group_rows("group_id").unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["102_34.57"], vec![0, 1]);
        assert_eq!(groups["9_-1.00"], vec![2]);
    }

    #[test]
    fn group_rows_skips_nulls_and_rejects_other_types() {
        let table = sample();
        let groups = table.group_rows("mode").unwrap();
        assert_eq!(groups["IW"], vec![1]);
        assert_eq!(groups.len(), 1);

        assert!(matches!(
            table.group_rows("orbit"),
            Err(Error::ColumnType { row: 0, expected: "string", actual: "int", .. })
        ));
    }

    #[test]
    fn from_geojson_then_export_keeps_rows_and_nulls_omitted() {
        let value = json!({
            "type": "FeatureCollection",
            "columns": {"x": "Integer"},
            "features": [
                {"type": "Feature", "id": "0", "geometry": {"type": "Point", "coordinates": [3.0, 4.0]}, "properties": {"x": 1}},
                {"type": "Feature", "id": "1", "geometry": null, "properties": {"y": "z"}}
            ]
        });
        let table = GeoTable::from_geojson(value).unwrap();
        assert_eq!(table.len(), 2);

        let out = table.to_geojson().unwrap();
        let features = out["features"].as_array().unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0]["properties"], json!({"x": 1}));
        assert_eq!(features[1]["properties"], json!({"y": "z"}));
        assert_eq!(features[0]["geometry"]["type"], "Point");
    }

    #[test]
    fn set_column_checks_length() {
        let mut table = sample();
        assert!(table.set_column("extra", vec![AttributeValue::Null]).is_err());
        table
            .set_column("extra", vec![AttributeValue::Int(1); 3])
            .unwrap();
        assert!(table.has_column("extra"));
    }
}
