//! Typed form fields and bound forms.
//!
//! Submitted data arrives as strings; `Form::full_clean` turns it into JSON
//! values ready for a config map, collecting one error message per field.

use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};

use crate::common::is_ip;
use crate::config::ConfigMap;

/// A rejected value. The message is shown to the user as is.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

const REQUIRED: &str = "This field is required.";

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Text { max_length: Option<usize> },
    Password { max_length: Option<usize> },
    Integer { min: Option<i64>, max: Option<i64> },
    Float { min: Option<f64>, max: Option<f64> },
    /// An unchecked box is simply absent from the submission.
    Boolean,
    /// `(stored value, label)` pairs.
    Choice { choices: Vec<(Value, String)> },
    IpAddress,
    /// Two integers written `low-high`, stored as `[low, high]`.
    IntRange { min: i64, max: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    pub required: bool,
    pub help: Option<String>,
}

impl Field {
    fn new(name: &str, label: &str, kind: FieldKind) -> Self {
        let required = !matches!(kind, FieldKind::Boolean);
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind,
            required,
            help: None,
        }
    }

    pub fn text(name: &str, label: &str) -> Self {
        Self::new(name, label, FieldKind::Text { max_length: None })
    }

    pub fn password(name: &str, label: &str) -> Self {
        Self::new(name, label, FieldKind::Password { max_length: None })
    }

    pub fn integer(name: &str, label: &str) -> Self {
        Self::new(name, label, FieldKind::Integer { min: None, max: None })
    }

    pub fn float(name: &str, label: &str) -> Self {
        Self::new(name, label, FieldKind::Float { min: None, max: None })
    }

    pub fn boolean(name: &str, label: &str) -> Self {
        Self::new(name, label, FieldKind::Boolean)
    }

    pub fn choice<V: Into<Value>>(
        name: &str,
        label: &str,
        choices: impl IntoIterator<Item = (V, &'static str)>,
    ) -> Self {
        let choices = choices
            .into_iter()
            .map(|(v, l)| (v.into(), l.to_string()))
            .collect();
        Self::new(name, label, FieldKind::Choice { choices })
    }

    pub fn ip_address(name: &str, label: &str) -> Self {
        Self::new(name, label, FieldKind::IpAddress)
    }

    pub fn int_range(name: &str, label: &str, min: i64, max: i64) -> Self {
        Self::new(name, label, FieldKind::IntRange { min, max })
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn help(mut self, text: &str) -> Self {
        self.help = Some(text.to_string());
        self
    }

    pub fn max_length(mut self, n: usize) -> Self {
        match &mut self.kind {
            FieldKind::Text { max_length } | FieldKind::Password { max_length } => {
                *max_length = Some(n)
            }
            _ => {}
        }
        self
    }

    /// Lower bound for integer and float fields.
    pub fn min(mut self, n: f64) -> Self {
        match &mut self.kind {
            FieldKind::Integer { min, .. } => *min = Some(n as i64),
            FieldKind::Float { min, .. } => *min = Some(n),
            _ => {}
        }
        self
    }

    /// Upper bound for integer and float fields.
    pub fn max(mut self, n: f64) -> Self {
        match &mut self.kind {
            FieldKind::Integer { max, .. } => *max = Some(n as i64),
            FieldKind::Float { max, .. } => *max = Some(n),
            _ => {}
        }
        self
    }

    /// Validate one submitted value.
    pub fn clean(&self, raw: Option<&str>) -> Result<Value, ValidationError> {
        let raw = raw.map(str::trim).filter(|s| !s.is_empty());

        if let FieldKind::Boolean = self.kind {
            let on = !matches!(raw, None | Some("off") | Some("false") | Some("0"));
            return Ok(Value::Bool(on));
        }

        let Some(raw) = raw else {
            if self.required {
                return Err(ValidationError::new(REQUIRED));
            }
            return Ok(match self.kind {
                FieldKind::Text { .. } | FieldKind::Password { .. } | FieldKind::IpAddress => {
                    json!("")
                }
                _ => Value::Null,
            });
        };

        match &self.kind {
            FieldKind::Text { max_length } | FieldKind::Password { max_length } => {
                let len = raw.chars().count();
                match max_length {
                    Some(max) if len > *max => Err(ValidationError(format!(
                        "Ensure this value has at most {} characters (it has {}).",
                        max, len
                    ))),
                    _ => Ok(json!(raw)),
                }
            }
            FieldKind::Integer { min, max } => {
                let n: i64 = raw
                    .parse()
                    .map_err(|_| ValidationError::new("Enter a whole number."))?;
                check_bounds(n, *min, *max)?;
                Ok(json!(n))
            }
            FieldKind::Float { min, max } => {
                let n: f64 = raw
                    .parse()
                    .ok()
                    .filter(|n: &f64| n.is_finite())
                    .ok_or_else(|| ValidationError::new("Enter a number."))?;
                check_bounds(n, *min, *max)?;
                Ok(json!(n))
            }
            FieldKind::Choice { choices } => choices
                .iter()
                .find(|(value, _)| value_to_input(value) == raw)
                .map(|(value, _)| value.clone())
                .ok_or_else(|| {
                    ValidationError(format!(
                        "Select a valid choice. {} is not one of the available choices.",
                        raw
                    ))
                }),
            FieldKind::IpAddress => {
                if is_ip(raw) {
                    Ok(json!(raw))
                } else {
                    Err(ValidationError::new("Enter a valid IP address."))
                }
            }
            FieldKind::IntRange { min, max } => {
                let bad = || ValidationError::new("Enter a range as two whole numbers: low-high.");
                let (low, high) = raw.split_once(|c: char| c == '-' || c == ':').ok_or_else(bad)?;
                let low: i64 = low.trim().parse().map_err(|_| bad())?;
                let high: i64 = high.trim().parse().map_err(|_| bad())?;
                check_bounds(low, Some(*min), Some(*max))?;
                check_bounds(high, Some(*min), Some(*max))?;
                if low > high {
                    return Err(ValidationError::new(
                        "The first number must not be larger than the second.",
                    ));
                }
                Ok(json!([low, high]))
            }
            FieldKind::Boolean => Ok(Value::Bool(true)),
        }
    }
}

fn check_bounds<T: PartialOrd + std::fmt::Display>(
    n: T,
    min: Option<T>,
    max: Option<T>,
) -> Result<(), ValidationError> {
    if let Some(min) = min {
        if n < min {
            return Err(ValidationError(format!(
                "Ensure this value is greater than or equal to {}.",
                min
            )));
        }
    }
    if let Some(max) = max {
        if n > max {
            return Err(ValidationError(format!(
                "Ensure this value is less than or equal to {}.",
                max
            )));
        }
    }
    Ok(())
}

/// Render a stored value the way it is typed into a form input.
pub fn value_to_input(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => if *b { "on" } else { "" }.to_string(),
        Value::Array(items) if items.len() == 2 => {
            format!("{}-{}", value_to_input(&items[0]), value_to_input(&items[1]))
        }
        other => other.to_string(),
    }
}

/// A set of fields bound to submitted (or initial) data.
#[derive(Debug, Clone)]
pub struct Form {
    fields: Vec<Field>,
    data: HashMap<String, String>,
    clean_data: ConfigMap,
    errors: BTreeMap<String, String>,
    cleaned: bool,
}

impl Form {
    pub fn bound(fields: Vec<Field>, data: HashMap<String, String>) -> Self {
        Self {
            fields,
            data,
            clean_data: ConfigMap::new(),
            errors: BTreeMap::new(),
            cleaned: false,
        }
    }

    /// Bind the current values of a config map. Keys the form has no field
    /// for are ignored.
    pub fn from_initial(fields: Vec<Field>, initial: &ConfigMap) -> Self {
        let data = fields
            .iter()
            .filter_map(|f| {
                let value = initial.get(&f.name)?;
                if matches!(f.kind, FieldKind::Boolean) && value_to_input(value).is_empty() {
                    return None;
                }
                Some((f.name.clone(), value_to_input(value)))
            })
            .collect();
        Self::bound(fields, data)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Raw bound value for a field, as it should appear in the input.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.data.get(name).map(String::as_str)
    }

    pub fn full_clean(&mut self) {
        self.clean_data.clear();
        self.errors.clear();
        for field in &self.fields {
            match field.clean(self.data.get(&field.name).map(String::as_str)) {
                Ok(value) => {
                    self.clean_data.insert(field.name.clone(), value);
                }
                Err(e) => {
                    self.errors.insert(field.name.clone(), e.0);
                }
            }
        }
        self.cleaned = true;
    }

    pub fn is_valid(&mut self) -> bool {
        if !self.cleaned {
            self.full_clean();
        }
        self.errors.is_empty()
    }

    pub fn clean_data(&self) -> &ConfigMap {
        &self.clean_data
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    pub fn error(&self, name: &str) -> Option<&str> {
        self.errors.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_text_and_password_fields() {
        let f = Field::text("base", "Base").max_length(4);
        assert_eq!(f.clean(Some(" /ab ")), Ok(json!("/ab")));
        assert_eq!(
            f.clean(Some("/abcde")).unwrap_err().0,
            "Ensure this value has at most 4 characters (it has 6)."
        );
        assert_eq!(f.clean(None).unwrap_err().0, REQUIRED);
        assert_eq!(f.clone().optional().clean(Some("")), Ok(json!("")));

        let p = Field::password("pwd", "Password").optional();
        assert_eq!(p.clean(Some("secret")), Ok(json!("secret")));
    }

    #[test]
    fn test_number_fields() {
        let port = Field::integer("port", "Port").min(1.0).max(65535.0);
        assert_eq!(port.clean(Some("8112")), Ok(json!(8112)));
        assert_eq!(port.clean(Some("abc")).unwrap_err().0, "Enter a whole number.");
        assert_eq!(
            port.clean(Some("0")).unwrap_err().0,
            "Ensure this value is greater than or equal to 1."
        );
        assert_eq!(
            port.clean(Some("70000")).unwrap_err().0,
            "Ensure this value is less than or equal to 65535."
        );
        assert_eq!(port.clone().optional().clean(Some("")), Ok(Value::Null));

        let speed = Field::float("speed", "Speed").min(-1.0);
        assert_eq!(speed.clean(Some("12.5")), Ok(json!(12.5)));
        assert_eq!(speed.clean(Some("nan")).unwrap_err().0, "Enter a number.");
        assert!(speed.clean(Some("-2")).is_err());
    }

    #[test]
    fn test_boolean_choice_ip_and_range() {
        let b = Field::boolean("dht", "DHT");
        assert!(!b.required);
        assert_eq!(b.clean(None), Ok(json!(false)));
        assert_eq!(b.clean(Some("on")), Ok(json!(true)));
        assert_eq!(b.clean(Some("off")), Ok(json!(false)));

        let c = Field::choice("enc_level", "Level", [(0, "Handshake"), (1, "Full Stream"), (2, "Either")]);
        assert_eq!(c.clean(Some("1")), Ok(json!(1)));
        assert_eq!(
            c.clean(Some("7")).unwrap_err().0,
            "Select a valid choice. 7 is not one of the available choices."
        );

        let ip = Field::ip_address("interface", "Interface");
        assert_eq!(ip.clean(Some("0.0.0.0")), Ok(json!("0.0.0.0")));
        assert!(ip.clean(Some("not.an.ip")).is_err());
        assert_eq!(ip.clone().optional().clean(None), Ok(json!("")));

        let r = Field::int_range("listen_ports", "Ports", 0, 65535);
        assert_eq!(r.clean(Some("6881-6891")), Ok(json!([6881, 6891])));
        assert_eq!(r.clean(Some("6881:6881")), Ok(json!([6881, 6881])));
        assert!(r.clean(Some("6891-6881")).is_err());
        assert!(r.clean(Some("6881")).is_err());
        assert!(r.clean(Some("1-70000")).is_err());
    }

    #[test]
    fn test_form_full_clean_collects_errors() {
        let fields = vec![
            Field::integer("port", "Port").min(1.0).max(65535.0),
            Field::boolean("auto_refresh", "Auto refresh"),
            Field::text("base", "Base"),
        ];
        let mut form = Form::bound(fields.clone(), data(&[("port", "x"), ("auto_refresh", "on")]));
        assert!(!form.is_valid());
        assert_eq!(form.error("port"), Some("Enter a whole number."));
        assert_eq!(form.error("base"), Some(REQUIRED));
        assert_eq!(form.clean_data().get("auto_refresh"), Some(&json!(true)));

        let mut form = Form::bound(fields, data(&[("port", "8112"), ("base", "/")]));
        assert!(form.is_valid());
        assert_eq!(form.clean_data().get("port"), Some(&json!(8112)));
        assert_eq!(form.clean_data().get("auto_refresh"), Some(&json!(false)));
    }

    #[test]
    fn test_form_from_initial_renders_values() {
        let fields = vec![
            Field::int_range("listen_ports", "Ports", 0, 65535),
            Field::boolean("dht", "DHT"),
            Field::boolean("upnp", "UPnP"),
            Field::float("max_download_speed", "Down"),
        ];
        let mut initial = ConfigMap::new();
        initial.insert("listen_ports".into(), json!([6881, 6891]));
        initial.insert("dht".into(), json!(true));
        initial.insert("upnp".into(), json!(false));
        initial.insert("max_download_speed".into(), json!(-1.0));
        initial.insert("unrelated".into(), json!("x"));

        let mut form = Form::from_initial(fields, &initial);
        assert_eq!(form.value("listen_ports"), Some("6881-6891"));
        assert_eq!(form.value("dht"), Some("on"));
        assert_eq!(form.value("upnp"), None);
        assert_eq!(form.value("unrelated"), None);
        assert!(form.is_valid());
        assert_eq!(form.clean_data().get("max_download_speed"), Some(&json!(-1.0)));
        assert_eq!(form.clean_data().get("upnp"), Some(&json!(false)));
    }
}
