use serde::de::DeserializeOwned;
use serde_json::Value;

/// TDLib's tag field.
pub const TYPE_FIELD: &str = "@type";

/// Tag of the event TDLib emits when it rejects a request.
pub const ERROR_TAG: &str = "error";

/// A single object pulled from the TDLib event stream.
///
/// The raw JSON is kept as-is; only the fields the core inspects are decoded,
/// on demand, through [`Event::decode`].
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    raw: Value,
}

impl Event {
    pub fn new(raw: Value) -> Self {
        Self { raw }
    }

    pub fn parse(text: &str) -> crate::Result<Self> {
        Ok(Self::new(serde_json::from_str(text)?))
    }

    /// The `@type` tag, or `""` when absent.
    pub fn tag(&self) -> &str {
        self.raw
            .get(TYPE_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn is_error(&self) -> bool {
        self.tag() == ERROR_TAG
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn into_raw(self) -> Value {
        self.raw
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.raw.get(field)
    }

    pub fn i64_field(&self, field: &str) -> Option<i64> {
        self.raw.get(field).and_then(Value::as_i64)
    }

    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.raw.get(field).and_then(Value::as_str)
    }

    /// Decode the payload into a typed view.
    pub fn decode<T: DeserializeOwned>(&self) -> crate::Result<T> {
        Ok(T::deserialize(&self.raw)?)
    }

    /// `(code, message)` of an `error` event.
    pub fn error_details(&self) -> Option<(i64, &str)> {
        if !self.is_error() {
            return None;
        }
        Some((
            self.i64_field("code").unwrap_or_default(),
            self.str_field("message").unwrap_or_default(),
        ))
    }
}

impl From<Value> for Event {
    fn from(raw: Value) -> Self {
        Self::new(raw)
    }
}

/// Predicate describing which incoming event satisfies a pending request.
pub enum MatchSpec {
    /// Exactly one accepted `@type`.
    Tag(String),
    /// Any of several accepted `@type`s.
    AnyOf(Vec<String>),
    /// Arbitrary predicate.
    Predicate(Box<dyn Fn(&Event) -> bool + Send + Sync>),
}

impl MatchSpec {
    pub fn tag(tag: impl Into<String>) -> Self {
        Self::Tag(tag.into())
    }

    pub fn any_of<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AnyOf(tags.into_iter().map(Into::into).collect())
    }

    pub fn predicate(f: impl Fn(&Event) -> bool + Send + Sync + 'static) -> Self {
        Self::Predicate(Box::new(f))
    }

    pub fn matches(&self, event: &Event) -> bool {
        match self {
            Self::Tag(tag) => event.tag() == tag,
            Self::AnyOf(tags) => tags.iter().any(|t| t == event.tag()),
            Self::Predicate(f) => f(event),
        }
    }
}

impl std::fmt::Debug for MatchSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tag(tag) => f.debug_tuple("Tag").field(tag).finish(),
            Self::AnyOf(tags) => f.debug_tuple("AnyOf").field(tags).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}
