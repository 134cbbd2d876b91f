//! One shared deterministic PRNG (§9 Design Notes, §5): reproducible across
//! runs at a fixed seed, diverging across forks only because the model is
//! cloned rather than restarted.

use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Debug, Clone)]
pub struct SharedRng(StdRng);

impl SharedRng {
    pub fn from_seed(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }

    pub fn inner_mut(&mut self) -> &mut StdRng {
        &mut self.0
    }
}

impl Default for SharedRng {
    fn default() -> Self {
        Self::from_seed(0)
    }
}
