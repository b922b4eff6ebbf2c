use crate::Generator;
use rand::distr::Alphanumeric;
use rand::Rng;
use shortlink_core::ShortCode;
use typed_builder::TypedBuilder;

pub const DEFAULT_CODE_LENGTH: usize = 8;

/// Produces fixed-length random alphanumeric codes.
///
/// 62^8 possible codes make collisions unlikely but not impossible.
#[derive(Debug, Clone, TypedBuilder)]
pub struct RandomGenerator {
    #[builder(default = DEFAULT_CODE_LENGTH)]
    length: usize,
}

impl RandomGenerator {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn length(&self) -> usize {
        self.length
    }
}

impl Default for RandomGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator for RandomGenerator {
    type Output = ShortCode;

    fn generate(&self) -> ShortCode {
        let code: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(self.length)
            .map(char::from)
            .collect();
        ShortCode::new_unchecked(code)
    }
}
