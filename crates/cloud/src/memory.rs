//! In-process evaluation of catalog expressions.
//!
//! [`MemoryCatalog`] holds seeded image collections and evaluates the same
//! wire [`Expression`]s that [`EeClient`](crate::ee_client::EeClient) sends
//! to the remote service, for the subset of algorithms this crate emits.
//! Geometry operations are planar: `Geometry.centroid` only validates
//! `maxError` and `Filter.intersects` tests planar intersection.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use geo::{Centroid, Intersects};
use geo_types::Geometry;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::backend::ComputeBackend;
use crate::error::{CloudError, Result};
use crate::expr::{Expression, ValueNode};

// ---------------------------------------------------------------------------
// Seed data
// ---------------------------------------------------------------------------

/// One image in a seeded collection.
#[derive(Debug, Clone)]
pub struct MemoryImage {
    /// Becomes `system:index` and the feature id.
    pub id: String,
    pub footprint: Geometry<f64>,
    pub time_start: DateTime<Utc>,
    /// User-visible metadata, as returned by `Image.toDictionary`.
    pub properties: Map<String, Value>,
}

impl MemoryImage {
    pub fn new(id: impl Into<String>, footprint: Geometry<f64>, time_start: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            footprint,
            time_start,
            properties: Map::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Seeded, read-only image catalog.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    collections: HashMap<String, Vec<MemoryImage>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(mut self, id: impl Into<String>, images: Vec<MemoryImage>) -> Self {
        self.insert_collection(id, images);
        self
    }

    pub fn insert_collection(&mut self, id: impl Into<String>, images: Vec<MemoryImage>) {
        self.collections.insert(id.into(), images);
    }

    /// Evaluate an expression synchronously.
    pub fn evaluate(&self, expression: &Expression) -> Result<Value> {
        let root = expression.values.get(&expression.result).ok_or_else(|| {
            CloudError::InvalidQuery(format!("result node '{}' missing", expression.result))
        })?;

        let eval = Evaluator {
            catalog: self,
            values: &expression.values,
        };
        let value = eval.eval(root, &HashMap::new())?;
        value.into_json()
    }
}

impl ComputeBackend for MemoryCatalog {
    async fn compute(&self, expression: &Expression) -> Result<Value> {
        debug!(nodes = expression.values.len(), "evaluating in memory");
        self.evaluate(expression)
    }
}

// ---------------------------------------------------------------------------
// Runtime values
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
enum ElementKind {
    Image,
    Feature,
}

#[derive(Debug, Clone)]
struct Element {
    kind: ElementKind,
    id: Option<String>,
    geometry: Option<Geometry<f64>>,
    time_start: Option<i64>,
    properties: Map<String, Value>,
}

impl Element {
    fn from_image(image: &MemoryImage) -> Self {
        Self {
            kind: ElementKind::Image,
            id: Some(image.id.clone()),
            geometry: Some(image.footprint.clone()),
            time_start: Some(image.time_start.timestamp_millis()),
            properties: image.properties.clone(),
        }
    }

    fn get(&self, property: &str) -> Value {
        match property {
            "system:index" => self.id.clone().map(Value::String).unwrap_or(Value::Null),
            "system:time_start" => self.time_start.map(Value::from).unwrap_or(Value::Null),
            _ => self.properties.get(property).cloned().unwrap_or(Value::Null),
        }
    }

    fn into_json(self) -> Value {
        let type_ = match self.kind {
            ElementKind::Image => "Image",
            ElementKind::Feature => "Feature",
        };
        let mut obj = Map::new();
        obj.insert("type".into(), Value::from(type_));
        if let Some(id) = self.id {
            obj.insert("id".into(), Value::String(id));
        }
        obj.insert(
            "geometry".into(),
            self.geometry.as_ref().map(geometry_json).unwrap_or(Value::Null),
        );
        obj.insert("properties".into(), Value::Object(self.properties));
        Value::Object(obj)
    }
}

#[derive(Debug, Clone)]
enum FilterSpec {
    Intersects(Geometry<f64>),
    /// `[start, end)` in epoch milliseconds.
    TimeRange(i64, i64),
}

impl FilterSpec {
    fn accepts(&self, element: &Element) -> bool {
        match self {
            Self::Intersects(aoi) => element
                .geometry
                .as_ref()
                .map(|g| g.intersects(aoi))
                .unwrap_or(false),
            Self::TimeRange(start, end) => element
                .time_start
                .map(|t| *start <= t && t < *end)
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone)]
enum Val {
    Json(Value),
    Geometry(Geometry<f64>),
    Element(Element),
    Collection(ElementKind, Vec<Element>),
    Filter(FilterSpec),
    TimeRange(i64, i64),
    ErrorMargin(f64),
    Function {
        parameters: Vec<String>,
        body: String,
        captured: HashMap<String, Val>,
    },
}

impl Val {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Json(Value::Null) => "null",
            Self::Json(Value::Bool(_)) => "Boolean",
            Self::Json(Value::Number(_)) => "Number",
            Self::Json(Value::String(_)) => "String",
            Self::Json(Value::Array(_)) => "List",
            Self::Json(Value::Object(_)) => "Dictionary",
            Self::Geometry(_) => "Geometry",
            Self::Element(e) if e.kind == ElementKind::Image => "Image",
            Self::Element(_) => "Feature",
            Self::Collection(..) => "Collection",
            Self::Filter(_) => "Filter",
            Self::TimeRange(..) => "DateRange",
            Self::ErrorMargin(_) => "ErrorMargin",
            Self::Function { .. } => "Function",
        }
    }

    fn into_json(self) -> Result<Value> {
        match self {
            Self::Json(v) => Ok(v),
            Self::Geometry(g) => Ok(geometry_json(&g)),
            Self::Element(e) => Ok(e.into_json()),
            Self::Collection(kind, elements) => {
                let type_ = match kind {
                    ElementKind::Image => "ImageCollection",
                    ElementKind::Feature => "FeatureCollection",
                };
                let features: Vec<Value> = elements.into_iter().map(Element::into_json).collect();
                Ok(json!({ "type": type_, "features": features }))
            }
            Self::TimeRange(start, end) => {
                Ok(json!({ "type": "DateRange", "dates": [start, end] }))
            }
            other => Err(CloudError::Evaluation(format!(
                "cannot materialize a {}",
                other.type_name()
            ))),
        }
    }
}

fn geometry_json(geometry: &Geometry<f64>) -> Value {
    serde_json::to_value(geojson::Geometry::new(geojson::Value::from(geometry)))
        .unwrap_or(Value::Null)
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

struct Evaluator<'a> {
    catalog: &'a MemoryCatalog,
    values: &'a BTreeMap<String, ValueNode>,
}

type Args = BTreeMap<String, Val>;

fn invalid(function: &str, argument: &str, expected: &str, actual: &Val) -> CloudError {
    CloudError::Evaluation(format!(
        "{function}, argument '{argument}': Invalid type. Expected type: {expected}. Actual type: {}.",
        actual.type_name()
    ))
}

fn take(args: &mut Args, function: &str, name: &str) -> Result<Val> {
    args.remove(name).ok_or_else(|| {
        CloudError::Evaluation(format!("{function}: required argument '{name}' is missing"))
    })
}

fn take_str(args: &mut Args, function: &str, name: &str) -> Result<String> {
    match take(args, function, name)? {
        Val::Json(Value::String(s)) => Ok(s),
        other => Err(invalid(function, name, "String", &other)),
    }
}

fn take_f64(args: &mut Args, function: &str, name: &str) -> Result<f64> {
    match take(args, function, name)? {
        Val::Json(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| CloudError::Evaluation(format!("{function}: '{name}' is not finite"))),
        other => Err(invalid(function, name, "Number", &other)),
    }
}

fn take_geometry(args: &mut Args, function: &str, name: &str) -> Result<Geometry<f64>> {
    match take(args, function, name)? {
        Val::Geometry(g) => Ok(g),
        other => Err(invalid(function, name, "Geometry", &other)),
    }
}

fn take_element(args: &mut Args, function: &str, name: &str) -> Result<Element> {
    match take(args, function, name)? {
        Val::Element(e) => Ok(e),
        other => Err(invalid(function, name, "Element", &other)),
    }
}

fn take_collection(
    args: &mut Args,
    function: &str,
    name: &str,
) -> Result<(ElementKind, Vec<Element>)> {
    match take(args, function, name)? {
        Val::Collection(kind, elements) => Ok((kind, elements)),
        other => Err(invalid(function, name, "Collection", &other)),
    }
}

/// Parse a date string (RFC 3339, `YYYY-MM-DDTHH:MM:SS` or `YYYY-MM-DD`, UTC)
/// or epoch milliseconds.
fn date_millis(function: &str, name: &str, value: Val) -> Result<i64> {
    match value {
        Val::Json(Value::Number(n)) => n
            .as_f64()
            .map(|f| f as i64)
            .ok_or_else(|| CloudError::Evaluation(format!("{function}: bad '{name}'"))),
        Val::Json(Value::String(s)) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
                return Ok(dt.timestamp_millis());
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S") {
                return Ok(dt.and_utc().timestamp_millis());
            }
            NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc().timestamp_millis())
                .ok_or_else(|| {
                    CloudError::Evaluation(format!("{function}: unable to parse date '{s}'"))
                })
        }
        other => Err(invalid(function, name, "Date", &other)),
    }
}

/// printf-style formatting of a single number.
///
/// Supports `%d`, `%f`, `%.Nf`, `%s` and `%%`; other text is copied verbatim.
pub(crate) fn format_number(value: f64, pattern: &str) -> Result<String> {
    let mut out = String::new();
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut precision = String::new();
        if chars.peek() == Some(&'.') {
            chars.next();
            while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                precision.push(d);
                chars.next();
            }
        }

        match chars.next() {
            Some('%') if precision.is_empty() => out.push('%'),
            Some('d') if precision.is_empty() => out.push_str(&(value.trunc() as i64).to_string()),
            Some('s') if precision.is_empty() => out.push_str(&value.to_string()),
            Some('f') => {
                let p = if precision.is_empty() {
                    6
                } else {
                    precision.parse::<usize>().map_err(|_| {
                        CloudError::Evaluation(format!(
                            "Number.format: bad precision in '{pattern}'"
                        ))
                    })?
                };
                out.push_str(&format_fixed(value, p));
            }
            _ => {
                return Err(CloudError::Evaluation(format!(
                    "Number.format: unsupported pattern '{pattern}'"
                )))
            }
        }
    }

    Ok(out)
}

/// Fixed-point formatting rounded half-up on the shortest decimal form of
/// `value`, so `34.565` gives `34.57` at two digits.
fn format_fixed(value: f64, precision: usize) -> String {
    if !value.is_finite() {
        return value.to_string();
    }

    let shortest = value.abs().to_string();
    let (int_part, frac_part) = shortest.split_once('.').unwrap_or((&shortest, ""));

    let mut digits: Vec<u8> = int_part.bytes().collect();
    let frac = frac_part.as_bytes();
    digits.extend((0..precision).map(|i| frac.get(i).copied().unwrap_or(b'0')));

    if frac.get(precision).is_some_and(|d| *d >= b'5') {
        let mut carry = true;
        for d in digits.iter_mut().rev() {
            if *d == b'9' {
                *d = b'0';
            } else {
                *d += 1;
                carry = false;
                break;
            }
        }
        if carry {
            digits.insert(0, b'1');
        }
    }

    let split = digits.len() - precision;
    let mut out = String::with_capacity(digits.len() + 2);
    if value.is_sign_negative() {
        out.push('-');
    }
    out.extend(digits[..split].iter().map(|d| char::from(*d)));
    if precision > 0 {
        out.push('.');
        out.extend(digits[split..].iter().map(|d| char::from(*d)));
    }
    out
}

impl Evaluator<'_> {
    fn eval(&self, node: &ValueNode, env: &HashMap<String, Val>) -> Result<Val> {
        match node {
            ValueNode::ConstantValue(v) => Ok(Val::Json(v.clone())),
            ValueNode::ArrayValue(array) => {
                let items = array
                    .values
                    .iter()
                    .map(|n| self.eval(n, env)?.into_json())
                    .collect::<Result<Vec<_>>>()?;
                Ok(Val::Json(Value::Array(items)))
            }
            ValueNode::DictionaryValue(dict) => {
                let map = dict
                    .values
                    .iter()
                    .map(|(k, n)| Ok((k.clone(), self.eval(n, env)?.into_json()?)))
                    .collect::<Result<Map<_, _>>>()?;
                Ok(Val::Json(Value::Object(map)))
            }
            ValueNode::ArgumentReference(name) => env.get(name).cloned().ok_or_else(|| {
                CloudError::InvalidQuery(format!("unbound argument '{name}'"))
            }),
            ValueNode::ValueReference(key) => self.eval(self.node(key)?, env),
            ValueNode::FunctionDefinitionValue(def) => Ok(Val::Function {
                parameters: def.argument_names.clone(),
                body: def.body.clone(),
                captured: env.clone(),
            }),
            ValueNode::FunctionInvocationValue(call) if call.function_name == "Collection.size" => {
                let collection = call.arguments.get("collection").ok_or_else(|| {
                    CloudError::Evaluation("Collection.size: missing argument 'collection'".into())
                })?;
                let size = self.size_of(collection, env)?;
                Ok(Val::Json(Value::from(size)))
            }
            ValueNode::FunctionInvocationValue(call) => {
                let args = call
                    .arguments
                    .iter()
                    .map(|(k, n)| Ok((k.clone(), self.eval(n, env)?)))
                    .collect::<Result<Args>>()?;
                self.invoke(&call.function_name, args)
            }
        }
    }

    /// Count a collection without running mapped functions over it.
    fn size_of(&self, node: &ValueNode, env: &HashMap<String, Val>) -> Result<usize> {
        match node {
            ValueNode::ValueReference(key) => self.size_of(self.node(key)?, env),
            ValueNode::FunctionInvocationValue(call) if call.function_name == "Collection.map" => {
                let source = call.arguments.get("collection").ok_or_else(|| {
                    CloudError::Evaluation("Collection.map: missing argument 'collection'".into())
                })?;
                self.size_of(source, env)
            }
            other => match self.eval(other, env)? {
                Val::Collection(_, elements) => Ok(elements.len()),
                other => Err(CloudError::Evaluation(format!(
                    "Collection.size: expected a Collection, got {}",
                    other.type_name()
                ))),
            },
        }
    }

    fn node(&self, key: &str) -> Result<&ValueNode> {
        self.values
            .get(key)
            .ok_or_else(|| CloudError::InvalidQuery(format!("value node '{key}' missing")))
    }

    fn apply(&self, function: &Val, argument: Val) -> Result<Val> {
        let Val::Function {
            parameters,
            body,
            captured,
        } = function
        else {
            return Err(CloudError::Evaluation(format!(
                "expected a Function, got {}",
                function.type_name()
            )));
        };
        let [param] = parameters.as_slice() else {
            return Err(CloudError::Evaluation(format!(
                "mapped function must take one argument, takes {}",
                parameters.len()
            )));
        };

        let mut env = captured.clone();
        env.insert(param.clone(), argument);
        self.eval(self.node(body)?, &env)
    }

    fn invoke(&self, name: &str, mut args: Args) -> Result<Val> {
        let a = &mut args;
        match name {
            "ImageCollection.load" => {
                let id = take_str(a, name, "id")?;
                let images = self.catalog.collections.get(&id).ok_or_else(|| {
                    CloudError::Evaluation(format!(
                        "ImageCollection.load: ImageCollection asset '{id}' not found."
                    ))
                })?;
                Ok(Val::Collection(
                    ElementKind::Image,
                    images.iter().map(Element::from_image).collect(),
                ))
            }
            "Collection.filter" => {
                let (kind, elements) = take_collection(a, name, "collection")?;
                let filter = match take(a, name, "filter")? {
                    Val::Filter(f) => f,
                    other => return Err(invalid(name, "filter", "Filter", &other)),
                };
                let kept = elements.into_iter().filter(|e| filter.accepts(e)).collect();
                Ok(Val::Collection(kind, kept))
            }
            "Collection.map" => {
                let (_, elements) = take_collection(a, name, "collection")?;
                let function = take(a, name, "baseAlgorithm")?;
                let mut out = Vec::with_capacity(elements.len());
                let mut out_kind = ElementKind::Image;
                for element in elements {
                    let source_id = element.id.clone();
                    match self.apply(&function, Val::Element(element))? {
                        Val::Element(mut mapped) => {
                            if mapped.id.is_none() {
                                mapped.id = source_id;
                            }
                            out_kind = mapped.kind;
                            out.push(mapped);
                        }
                        other => return Err(invalid(name, "baseAlgorithm", "Element", &other)),
                    }
                }
                Ok(Val::Collection(out_kind, out))
            }
            "Filter.intersects" => {
                let field = take_str(a, name, "leftField")?;
                if field != ".all" && field != ".geo" {
                    return Err(CloudError::Evaluation(format!(
                        "Filter.intersects: unsupported leftField '{field}'"
                    )));
                }
                Ok(Val::Filter(FilterSpec::Intersects(take_geometry(
                    a,
                    name,
                    "rightValue",
                )?)))
            }
            "Filter.dateRangeContains" => {
                let field = take_str(a, name, "rightField")?;
                if field != "system:time_start" {
                    return Err(CloudError::Evaluation(format!(
                        "Filter.dateRangeContains: unsupported rightField '{field}'"
                    )));
                }
                match take(a, name, "leftValue")? {
                    Val::TimeRange(start, end) => {
                        Ok(Val::Filter(FilterSpec::TimeRange(start, end)))
                    }
                    other => Err(invalid(name, "leftValue", "DateRange", &other)),
                }
            }
            "DateRange" => {
                let start = date_millis(name, "start", take(a, name, "start")?)?;
                let end = date_millis(name, "end", take(a, name, "end")?)?;
                Ok(Val::TimeRange(start, end))
            }
            "ErrorMargin" => Ok(Val::ErrorMargin(take_f64(a, name, "value")?)),
            "Geometry.centroid" => {
                let geometry = take_geometry(a, name, "geometry")?;
                match a.remove("maxError") {
                    None => {}
                    Some(Val::ErrorMargin(margin)) if margin >= 0.0 => {}
                    Some(Val::ErrorMargin(margin)) => {
                        return Err(CloudError::Evaluation(format!(
                            "{name}: maxError must not be negative, got {margin}"
                        )))
                    }
                    Some(other) => return Err(invalid(name, "maxError", "ErrorMargin", &other)),
                }
                geometry
                    .centroid()
                    .map(|p| Val::Geometry(Geometry::Point(p)))
                    .ok_or_else(|| {
                        CloudError::Evaluation("Geometry.centroid: empty geometry".into())
                    })
            }
            "Geometry.coordinates" => {
                let geometry = take_geometry(a, name, "geometry")?;
                Ok(Val::Json(geometry_json(&geometry)["coordinates"].clone()))
            }
            "Image.geometry" | "Feature.geometry" | "Element.geometry" => {
                let element = take_element(a, name, "feature")?;
                element
                    .geometry
                    .map(Val::Geometry)
                    .ok_or_else(|| {
                        CloudError::Evaluation(format!("{name}: element has no geometry"))
                    })
            }
            "Element.get" => {
                let element = take_element(a, name, "object")?;
                let property = take_str(a, name, "property")?;
                Ok(Val::Json(element.get(&property)))
            }
            "Element.set" => {
                let mut element = take_element(a, name, "object")?;
                let key = take_str(a, name, "key")?;
                let value = take(a, name, "value")?.into_json()?;
                element.properties.insert(key, value);
                Ok(Val::Element(element))
            }
            "Image.toDictionary" => {
                let element = take_element(a, name, "image")?;
                Ok(Val::Json(Value::Object(element.properties)))
            }
            "Feature" => {
                let geometry = match a.remove("geometry") {
                    Some(Val::Geometry(g)) => Some(g),
                    Some(Val::Json(Value::Null)) | None => None,
                    Some(other) => return Err(invalid(name, "geometry", "Geometry", &other)),
                };
                let properties = match a.remove("metadata") {
                    Some(Val::Json(Value::Object(map))) => map,
                    Some(Val::Json(Value::Null)) | None => Map::new(),
                    Some(other) => return Err(invalid(name, "metadata", "Dictionary", &other)),
                };
                Ok(Val::Element(Element {
                    kind: ElementKind::Feature,
                    id: None,
                    geometry,
                    time_start: None,
                    properties,
                }))
            }
            "List.get" => {
                let list = match take(a, name, "list")? {
                    Val::Json(Value::Array(items)) => items,
                    other => return Err(invalid(name, "list", "List", &other)),
                };
                let index = take_f64(a, name, "index")? as i64;
                let len = list.len() as i64;
                let i = if index < 0 { len + index } else { index };
                if i < 0 || i >= len {
                    return Err(CloudError::Evaluation(format!(
                        "List.get: List index must be between -{len} and {}: {index}.",
                        len - 1
                    )));
                }
                Ok(Val::Json(list[i as usize].clone()))
            }
            "Number.format" => {
                let number = take_f64(a, name, "number")?;
                let pattern = match a.remove("pattern") {
                    Some(Val::Json(Value::String(p))) => p,
                    None => "%s".to_string(),
                    Some(other) => return Err(invalid(name, "pattern", "String", &other)),
                };
                Ok(Val::Json(Value::String(format_number(number, &pattern)?)))
            }
            "String.cat" => {
                let first = take_str(a, name, "string1")?;
                let second = take_str(a, name, "string2")?;
                Ok(Val::Json(Value::String(first + &second)))
            }
            ctor if ctor.starts_with("GeometryConstructors.") => {
                let kind = &ctor["GeometryConstructors.".len()..];
                let coordinates = match take(a, name, "coordinates")? {
                    Val::Json(v) => v,
                    other => return Err(invalid(name, "coordinates", "List", &other)),
                };
                construct_geometry(kind, coordinates).map(Val::Geometry)
            }
            other => Err(CloudError::Evaluation(format!(
                "unsupported algorithm '{other}'"
            ))),
        }
    }
}

fn construct_geometry(kind: &str, coordinates: Value) -> Result<Geometry<f64>> {
    let bad = |e: &dyn std::fmt::Display| {
        CloudError::Evaluation(format!("GeometryConstructors.{kind}: {e}"))
    };

    if kind == "Rectangle" {
        let corners: Vec<[f64; 2]> = serde_json::from_value(coordinates).map_err(|e| bad(&e))?;
        let [min, max] = corners.as_slice() else {
            return Err(bad(&"expected two corners"));
        };
        let rect = geo_types::Rect::new((min[0], min[1]), (max[0], max[1]));
        return Ok(Geometry::Polygon(rect.to_polygon()));
    }

    let geojson = json!({ "type": kind, "coordinates": coordinates });
    let parsed = geojson::Geometry::from_json_value(geojson).map_err(|e| bad(&e))?;
    Geometry::<f64>::try_from(parsed).map_err(|e| bad(&e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{ComputedObject, EeString, Geometry as EeGeometry, ImageCollection};
    use chrono::TimeZone;
    use geo_types::polygon;

    fn image(id: &str, x0: f64, day: u32) -> MemoryImage {
        let footprint = Geometry::Polygon(polygon![
            (x: x0, y: 0.0), (x: x0 + 2.0, y: 0.0), (x: x0 + 2.0, y: 2.0), (x: x0, y: 2.0)
        ]);
        MemoryImage::new(id, footprint, Utc.with_ymd_and_hms(2021, 3, day, 6, 0, 0).unwrap())
            .with_property("relativeOrbitNumber_start", 7)
    }

    fn catalog() -> MemoryCatalog {
        MemoryCatalog::new().with_collection(
            "C",
            vec![image("a", 0.0, 1), image("b", 10.0, 2), image("c", 0.5, 20)],
        )
    }

    fn eval<O: ComputedObject>(catalog: &MemoryCatalog, object: &O) -> Result<Value> {
        catalog.evaluate(&object.encode())
    }

    #[test]
    fn format_number_patterns() {
        assert_eq!(format_number(34.567, "%.2f").unwrap(), "34.57");
        assert_eq!(format_number(34.565, "%.2f").unwrap(), "34.57");
        assert_eq!(format_number(1.005, "%.2f").unwrap(), "1.01");
        assert_eq!(format_number(2.675, "%.2f").unwrap(), "2.68");
        assert_eq!(format_number(0.125, "%.2f").unwrap(), "0.13");
        assert_eq!(format_number(-34.565, "%.2f").unwrap(), "-34.57");
        assert_eq!(format_number(9.999, "%.2f").unwrap(), "10.00");
        assert_eq!(format_number(2.5, "%.0f").unwrap(), "3");
        assert_eq!(format_number(-3.0, "%.2f").unwrap(), "-3.00");
        assert_eq!(format_number(102.0, "%d").unwrap(), "102");
        assert_eq!(format_number(1.5, "x=%f%%").unwrap(), "x=1.500000%");
        assert!(format_number(1.0, "%q").is_err());
    }

    #[test]
    fn load_and_size() {
        let c = catalog();
        let size = eval(&c, &ImageCollection::load("C").size()).unwrap();
        assert_eq!(size, json!(3));

        let err = eval(&c, &ImageCollection::load("missing").size()).unwrap_err();
        assert!(matches!(err, CloudError::Evaluation(_)));
    }

    #[test]
    fn filters_combine_with_and() {
        let c = catalog();
        let aoi = EeGeometry::rectangle(1.0, 1.0, 1.5, 1.5);
        let col = ImageCollection::load("C")
            .filter_bounds(&aoi)
            .filter_date("2021-03-01", "2021-03-10");
        // "a" matches both, "b" is outside the AOI, "c" is outside the dates.
        assert_eq!(eval(&c, &col.size()).unwrap(), json!(1));
    }

    #[test]
    fn date_filter_is_half_open() {
        let c = catalog();
        let col = ImageCollection::load("C").filter_date("2021-03-01", "2021-03-01T06:00:00");
        assert_eq!(eval(&c, &col.size()).unwrap(), json!(0));
        let col = ImageCollection::load("C").filter_date("2021-03-01T06:00:00Z", "2021-03-02");
        assert_eq!(eval(&c, &col.size()).unwrap(), json!(1));
    }

    #[test]
    fn map_sets_property_from_metadata() {
        let c = catalog();
        let col = ImageCollection::load("C").map(|img| {
            let label = img
                .get_number("relativeOrbitNumber_start")
                .format("%d")
                .cat(&EeString::new("!"));
            img.set("label", label)
        });
        let out = eval(&c, &col).unwrap();
        assert_eq!(out["type"], "ImageCollection");
        let features = out["features"].as_array().unwrap();
        assert_eq!(features.len(), 3);
        assert!(features.iter().all(|f| f["properties"]["label"] == "7!"));
        assert_eq!(features[0]["id"], "a");
    }

    #[test]
    fn centroid_longitude() {
        let c = catalog();
        let col = ImageCollection::load("C").map(|img| {
            let lon = img.geometry().centroid(1.0).coordinates().get_number(0).format("%.2f");
            img.set("lon", lon)
        });
        let out = eval(&c, &col).unwrap();
        assert_eq!(out["features"][0]["properties"]["lon"], "1.00");
        assert_eq!(out["features"][1]["properties"]["lon"], "11.00");
    }

    #[test]
    fn negative_centroid_error_is_rejected() {
        let c = catalog();
        let col = ImageCollection::load("C").map(|img| {
            let lon = img.geometry().centroid(-1.0).coordinates().get_number(0).format("%.2f");
            img.set("lon", lon)
        });
        let err = eval(&c, &col).unwrap_err();
        assert!(err.to_string().contains("maxError"));
    }

    #[test]
    fn formatting_missing_property_fails() {
        let c = catalog();
        let col = ImageCollection::load("C")
            .map(|img| img.set("x", img.get_number("nope").format("%d")));
        let err = eval(&c, &col).unwrap_err();
        assert!(err.to_string().contains("Number.format"));
    }

    #[test]
    fn size_does_not_run_mapped_function() {
        let c = catalog();
        let col = ImageCollection::load("C")
            .map(|img| img.set("x", img.get_number("nope").format("%d")));
        assert_eq!(eval(&c, &col.size()).unwrap(), json!(3));
    }

    #[tokio::test]
    async fn compute_through_backend_trait() {
        let c = catalog();
        let v = crate::backend::get_info(&c, &ImageCollection::load("C").size())
            .await
            .unwrap();
        assert_eq!(v, json!(3));
    }
}
