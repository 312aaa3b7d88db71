use std::{
    fmt::{Debug, Display},
    ops::Deref,
    str::FromStr,
};

/// A validated value of a Kubernetes key/value pair (a label or an
/// annotation).
///
/// Implementors guarantee that any successfully parsed value already
/// satisfies the Kubernetes wire format for that kind of value, so callers
/// never need to re-validate before sending it to the API server.
pub trait Value:
    Clone + Debug + Default + Display + Deref<Target = str> + Eq + FromStr<Err = Self::Error> + Ord
{
    type Error: std::error::Error + 'static;
}
