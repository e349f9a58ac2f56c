/// Tunables for the coordination engine
#[derive(Debug, Clone)]
pub struct Config {
    /// Length of generated join codes
    pub join_code_length: usize,
    /// Members required before the host can start a race
    pub min_players_to_start: usize,
    /// Capacity of lobbies created by quick play
    pub quick_play_max_players: u32,
    /// How many recent public lobbies quick play considers
    pub quick_play_lookback: usize,
    /// Maximum number of lobbies in the public listing
    pub public_listing_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            join_code_length: 4,
            min_players_to_start: 2,
            quick_play_max_players: 8,
            quick_play_lookback: 10,
            public_listing_limit: 20,
        }
    }
}
