use rand::{distributions::Alphanumeric, seq::SliceRandom, thread_rng, Rng};

pub fn random_string(length: usize) -> String {
    let mut rng = thread_rng();

    std::iter::repeat(())
        .map(|_| rng.sample(Alphanumeric) as char)
        .take(length)
        .collect()
}

/// Picks `length` characters uniformly from `alphabet`
pub fn random_string_from(alphabet: &[u8], length: usize) -> String {
    let mut rng = thread_rng();

    std::iter::repeat(())
        .filter_map(|_| alphabet.choose(&mut rng))
        .map(|&b| b as char)
        .take(length)
        .collect()
}
