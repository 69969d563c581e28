//! Typed handles over lazy server-side objects.
//!
//! Each handle wraps an [`Expr`] and exposes the server-side algorithms that
//! apply to it. Nothing here talks to the network: methods only grow the
//! expression tree.

use crate::error::{CloudError, Result};
use crate::expr::{Expr, Expression};

/// Common behavior of every lazy handle.
pub trait ComputedObject: Sized {
    fn from_expr(expr: Expr) -> Self;

    fn expr(&self) -> &Expr;

    fn into_expr(self) -> Expr;

    /// Encode into the wire format.
    fn encode(&self) -> Expression {
        Expression::encode(self.expr())
    }
}

macro_rules! computed_object {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, PartialEq)]
            pub struct $name(Expr);

            impl ComputedObject for $name {
                fn from_expr(expr: Expr) -> Self {
                    Self(expr)
                }

                fn expr(&self) -> &Expr {
                    &self.0
                }

                fn into_expr(self) -> Expr {
                    self.0
                }
            }
        )*
    };
}

computed_object!(
    /// A remote image collection.
    ImageCollection,
    /// A single remote image.
    Image,
    /// A remote geometry.
    Geometry,
    /// A collection filter.
    Filter,
    /// A remote number.
    Number,
    /// A remote string.
    EeString,
    /// A remote list.
    List,
    /// A remote dictionary.
    Dictionary,
    /// A single remote feature.
    Feature,
    /// A remote feature collection.
    FeatureCollection,
);

/// Placeholder argument name while the mapped body is built.
const MAPPING_PLACEHOLDER: &str = "_MAPPING_VAR_PENDING";

/// Build a `Function` node for `Collection.map`.
///
/// The parameter is named after the nesting depth of the body so that
/// nested maps never shadow each other.
fn mapping_function<I, O, F>(f: F) -> Expr
where
    I: ComputedObject,
    O: ComputedObject,
    F: FnOnce(I) -> O,
{
    let body = f(I::from_expr(Expr::Argument(MAPPING_PLACEHOLDER.to_string()))).into_expr();
    let name = format!("_MAPPING_VAR_{}_0", body.function_depth());
    Expr::Function {
        parameters: vec![name.clone()],
        body: Box::new(body.rename_argument(MAPPING_PLACEHOLDER, &name)),
    }
}

fn collection_map(collection: Expr, function: Expr) -> Expr {
    Expr::invoke(
        "Collection.map",
        [("collection", collection), ("baseAlgorithm", function)],
    )
}

// ---------------------------------------------------------------------------
// ImageCollection
// ---------------------------------------------------------------------------

impl ImageCollection {
    /// Reference a catalog collection by id, e.g. `COPERNICUS/S1_GRD`.
    pub fn load(id: &str) -> Self {
        Self(Expr::invoke("ImageCollection.load", [("id", Expr::constant(id))]))
    }

    pub fn filter(&self, filter: &Filter) -> Self {
        Self(Expr::invoke(
            "Collection.filter",
            [
                ("collection", self.0.clone()),
                ("filter", filter.expr().clone()),
            ],
        ))
    }

    /// Keep images whose footprint intersects `geometry`.
    pub fn filter_bounds(&self, geometry: &Geometry) -> Self {
        self.filter(&Filter::bounds(geometry))
    }

    /// Keep images acquired in `[start, end)`.
    pub fn filter_date(&self, start: &str, end: &str) -> Self {
        self.filter(&Filter::date(start, end))
    }

    /// Apply `f` to every image, server-side.
    pub fn map<F>(&self, f: F) -> Self
    where
        F: FnOnce(Image) -> Image,
    {
        Self(collection_map(self.0.clone(), mapping_function(f)))
    }

    /// Map every image to a feature.
    pub fn map_to_features<F>(&self, f: F) -> FeatureCollection
    where
        F: FnOnce(Image) -> Feature,
    {
        FeatureCollection(collection_map(self.0.clone(), mapping_function(f)))
    }

    pub fn size(&self) -> Number {
        Number(Expr::invoke("Collection.size", [("collection", self.0.clone())]))
    }
}

// ---------------------------------------------------------------------------
// Image
// ---------------------------------------------------------------------------

impl Image {
    /// Footprint of the image.
    pub fn geometry(&self) -> Geometry {
        Geometry(Expr::invoke("Image.geometry", [("feature", self.0.clone())]))
    }

    /// Metadata property, as a number.
    pub fn get_number(&self, property: &str) -> Number {
        Number(element_get(&self.0, property))
    }

    /// Return a copy of the image with `key` set to `value`.
    pub fn set<V: ComputedObject>(&self, key: &str, value: V) -> Image {
        Image(Expr::invoke(
            "Element.set",
            [
                ("object", self.0.clone()),
                ("key", Expr::constant(key)),
                ("value", value.into_expr()),
            ],
        ))
    }

    /// All metadata properties as a dictionary.
    pub fn to_dictionary(&self) -> Dictionary {
        Dictionary(Expr::invoke("Image.toDictionary", [("image", self.0.clone())]))
    }
}

fn element_get(object: &Expr, property: &str) -> Expr {
    Expr::invoke(
        "Element.get",
        [
            ("object", object.clone()),
            ("property", Expr::constant(property)),
        ],
    )
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

type Coord = [f64; 2];

fn coords(ls: &geo_types::LineString<f64>) -> Vec<Coord> {
    ls.0.iter().map(|c| [c.x, c.y]).collect()
}

fn polygon_coords(p: &geo_types::Polygon<f64>) -> Vec<Vec<Coord>> {
    std::iter::once(p.exterior())
        .chain(p.interiors())
        .map(coords)
        .collect()
}

impl Geometry {
    fn construct(kind: &str, coordinates: serde_json::Value) -> Self {
        Self(Expr::invoke(
            &format!("GeometryConstructors.{kind}"),
            [("coordinates", Expr::Constant(coordinates))],
        ))
    }

    pub fn point(x: f64, y: f64) -> Self {
        Self::construct("Point", serde_json::json!([x, y]))
    }

    /// Axis-aligned rectangle `[west, south, east, north]`.
    pub fn rectangle(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self::construct("Rectangle", serde_json::json!([[west, south], [east, north]]))
    }

    /// Build a remote geometry from a local one.
    pub fn from_geo(geometry: &geo_types::Geometry<f64>) -> Result<Self> {
        use geo_types::Geometry as G;
        use serde_json::json;

        let g = match geometry {
            G::Point(p) => Self::point(p.x(), p.y()),
            G::MultiPoint(mp) => Self::construct(
                "MultiPoint",
                json!(mp.0.iter().map(|p| [p.x(), p.y()]).collect::<Vec<_>>()),
            ),
            G::LineString(ls) => Self::construct("LineString", json!(coords(ls))),
            G::MultiLineString(mls) => Self::construct(
                "MultiLineString",
                json!(mls.0.iter().map(coords).collect::<Vec<_>>()),
            ),
            G::Polygon(p) => Self::construct("Polygon", json!(polygon_coords(p))),
            G::MultiPolygon(mp) => Self::construct(
                "MultiPolygon",
                json!(mp.0.iter().map(polygon_coords).collect::<Vec<_>>()),
            ),
            G::Rect(r) => Self::rectangle(r.min().x, r.min().y, r.max().x, r.max().y),
            other => {
                return Err(CloudError::InvalidQuery(format!(
                    "unsupported AOI geometry: {other:?}"
                )))
            }
        };
        Ok(g)
    }

    /// Centroid, computed with the given maximum error.
    pub fn centroid(&self, max_error: f64) -> Geometry {
        let margin = Expr::invoke("ErrorMargin", [("value", Expr::constant(max_error))]);
        Geometry(Expr::invoke(
            "Geometry.centroid",
            [("geometry", self.0.clone()), ("maxError", margin)],
        ))
    }

    pub fn coordinates(&self) -> List {
        List(Expr::invoke("Geometry.coordinates", [("geometry", self.0.clone())]))
    }
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

impl Filter {
    /// Elements whose geometry intersects `geometry`.
    pub fn bounds(geometry: &Geometry) -> Self {
        Self(Expr::invoke(
            "Filter.intersects",
            [
                ("leftField", Expr::constant(".all")),
                ("rightValue", geometry.expr().clone()),
            ],
        ))
    }

    /// Elements whose `system:time_start` lies in `[start, end)`.
    pub fn date(start: &str, end: &str) -> Self {
        let range = Expr::invoke(
            "DateRange",
            [("start", Expr::constant(start)), ("end", Expr::constant(end))],
        );
        Self(Expr::invoke(
            "Filter.dateRangeContains",
            [
                ("leftValue", range),
                ("rightField", Expr::constant("system:time_start")),
            ],
        ))
    }
}

// ---------------------------------------------------------------------------
// Scalars
// ---------------------------------------------------------------------------

impl List {
    pub fn get_number(&self, index: i64) -> Number {
        Number(Expr::invoke(
            "List.get",
            [("list", self.0.clone()), ("index", Expr::constant(index))],
        ))
    }
}

impl Number {
    /// printf-style formatting, e.g. `"%d"` or `"%.2f"`.
    pub fn format(&self, pattern: &str) -> EeString {
        EeString(Expr::invoke(
            "Number.format",
            [("number", self.0.clone()), ("pattern", Expr::constant(pattern))],
        ))
    }
}

impl EeString {
    pub fn new(value: &str) -> Self {
        Self(Expr::constant(value))
    }

    pub fn cat(&self, other: &EeString) -> EeString {
        EeString(Expr::invoke(
            "String.cat",
            [("string1", self.0.clone()), ("string2", other.0.clone())],
        ))
    }
}

impl Feature {
    /// A feature with the given geometry and properties.
    pub fn new(geometry: &Geometry, properties: &Dictionary) -> Self {
        Self(Expr::invoke(
            "Feature",
            [
                ("geometry", geometry.0.clone()),
                ("metadata", properties.0.clone()),
            ],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ValueNode;
    use geo_types::polygon;
    use serde_json::json;

    #[test]
    fn methods_do_not_mutate_receiver() {
        let base = ImageCollection::load("A");
        let filtered = base.filter_date("2020-01-01", "2020-02-01");
        assert_eq!(base, ImageCollection::load("A"));
        assert_ne!(base, filtered);
    }

    #[test]
    fn map_names_parameter_by_depth() {
        let col = ImageCollection::load("A").map(|img| img);
        let Expr::Invocation { arguments, .. } = col.expr() else {
            panic!("expected invocation");
        };
        assert_eq!(
            arguments["baseAlgorithm"],
            Expr::Function {
                parameters: vec!["_MAPPING_VAR_0_0".into()],
                body: Box::new(Expr::Argument("_MAPPING_VAR_0_0".into())),
            }
        );
    }

    #[test]
    fn polygon_aoi_encodes_rings() {
        let poly = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)];
        let aoi = Geometry::from_geo(&geo_types::Geometry::Polygon(poly)).unwrap();
        let encoded = aoi.encode();
        let ValueNode::FunctionInvocationValue(call) = &encoded.values[&encoded.result] else {
            panic!("expected invocation");
        };
        assert_eq!(call.function_name, "GeometryConstructors.Polygon");
        assert_eq!(
            call.arguments["coordinates"],
            ValueNode::ConstantValue(json!([[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]))
        );
    }

    #[test]
    fn unsupported_aoi_is_rejected() {
        let line = geo_types::Line::new((0.0, 0.0), (1.0, 1.0));
        let err = Geometry::from_geo(&geo_types::Geometry::Line(line)).unwrap_err();
        assert!(matches!(err, CloudError::InvalidQuery(_)));
    }
}
