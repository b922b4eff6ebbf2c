pub mod random;
#[cfg(feature = "seq")]
pub mod seq;

pub use random::RandomGenerator;
#[cfg(feature = "seq")]
pub use seq::SeqGenerator;

use shortlink_core::ShortCode;

/// Trait for generating short codes.
///
/// Implementations are pure generators that don't interact with storage.
/// Backends never retry on a collision, so uniqueness is only as good as the
/// generator makes it.
pub trait Generator: Send + Sync + 'static {
    type Output: Into<ShortCode>;

    /// Generates a value that can be converted into a short code.
    fn generate(&self) -> Self::Output;
}
