//! Blank node label allocation for one parse session.
//!
//! Every session draws a 128-bit prefix, rendered as 32 hex digits. Labels the
//! parser invents are `{prefix}b{n}`; labels written in the document
//! (`_:x`) become `{prefix}u{x}`. Two documents therefore never share blank
//! nodes, and an invented label can't collide with a document label.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Allocates blank node labels scoped to one parse session.
#[derive(Debug, Clone)]
pub struct BlankNodeGenerator {
    prefix: String,
    counter: u64,
}

impl BlankNodeGenerator {
    /// A generator with a random prefix.
    pub fn new() -> Self {
        Self::with_prefix_bits(rand::rng().random::<u128>())
    }

    /// A generator whose prefix is derived from `seed`, for reproducible output.
    pub fn seeded(seed: u64) -> Self {
        Self::from_rng(&mut StdRng::seed_from_u64(seed))
    }

    /// A generator drawing its prefix from `rng`. A parser that owns a seeded
    /// rng gets a new, reproducible prefix for every document.
    pub fn from_rng<R: Rng>(rng: &mut R) -> Self {
        Self::with_prefix_bits(rng.random::<u128>())
    }

    fn with_prefix_bits(bits: u128) -> Self {
        Self {
            prefix: format!("{:032x}", bits),
            counter: 0,
        }
    }

    /// The session prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// A fresh label.
    pub fn fresh(&mut self) -> String {
        let label = format!("{}b{}", self.prefix, self.counter);
        self.counter += 1;
        label
    }

    /// The session label for a label written in the document.
    pub fn scoped(&self, user_label: &str) -> String {
        format!("{}u{}", self.prefix, user_label)
    }
}

impl Default for BlankNodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}
