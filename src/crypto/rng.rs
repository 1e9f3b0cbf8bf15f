/// Marker trait for a cryptographically secure RNG, so call sites can take
/// `&mut dyn CryptoRng` instead of being generic over a concrete RNG type.
/// Blanket-implemented for anything that is both a `RngCore` and a
/// `rand_core::CryptoRng` (e.g. `rand::rngs::StdRng`, `rand::rngs::OsRng`).
pub trait CryptoRng: rand_core::RngCore + rand_core::CryptoRng {}

impl<T: rand_core::RngCore + rand_core::CryptoRng> CryptoRng for T {}
