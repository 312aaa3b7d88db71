//! Small generic helpers that are missing from [`std::iter`].

/// Like [`FromIterator`], but for element conversions that can fail.
///
/// Implementations typically validate each item as it is folded into the
/// resulting collection and bail out on the first invalid one.
pub trait TryFromIterator<A>: Sized {
    type Error;

    fn try_from_iter<T: IntoIterator<Item = A>>(iter: T) -> Result<Self, Self::Error>;
}
