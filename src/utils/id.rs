use rand::distributions::Alphanumeric;
use rand::Rng;

const ID_LENGTH: usize = 21;

/// Random URL-safe identifier used for message ids, processor instance ids
/// and per-execution host-binding prefixes.
pub fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LENGTH)
        .map(char::from)
        .collect()
}
