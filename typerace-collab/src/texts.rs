//! Race passages for lobbies created without an explicit text.

use rand::{seq::SliceRandom, thread_rng};

const QUOTES: &[&str] = &[
    "The only way to do great work is to love what you do.",
    "Innovation distinguishes between a leader and a follower.",
    "Life is what happens when you're busy making other plans.",
    "The future belongs to those who believe in the beauty of their dreams.",
    "It is during our darkest moments that we must focus to see the light.",
    "Do not go where the path may lead, go instead where there is no path and leave a trail.",
    "The only impossible journey is the one you never begin.",
    "Success is not final, failure is not fatal: it is the courage to continue that counts.",
    "It is better to fail in originality than to succeed in imitation.",
    "Success usually comes to those who are too busy to be looking for it.",
    "Don't watch the clock; do what it does. Keep going.",
    "The secret of getting ahead is getting started.",
    "Your time is limited, so don't waste it living someone else's life.",
    "The best time to plant a tree was 20 years ago. The second best time is now.",
    "Everything you've ever wanted is on the other side of fear.",
    "Hardships often prepare ordinary people for an extraordinary destiny.",
    "Believe you can and you're halfway there.",
    "The only person you are destined to become is the person you decide to be.",
    "Everything has beauty, but not everyone can see.",
    "Happiness is not something ready made. It comes from your own actions.",
];

const CODE_SNIPPETS: &[&str] = &[
    "fn sum(numbers: &[i32]) -> i32 {\n    numbers.iter().sum()\n}",
    "let greeting = |name: &str| format!(\"Hello, {name}! Welcome to the application.\");",
    "struct User {\n    name: String,\n    email: String,\n}\n\nimpl User {\n    fn greet(&self) -> String {\n        format!(\"Hi, I'm {}\", self.name)\n    }\n}",
    "async fn fetch(url: &str) -> Result<String, Error> {\n    let response = client.get(url).send().await?;\n    response.text().await\n}",
    "let numbers = vec![1, 2, 3, 4, 5];\nlet doubled: Vec<_> = numbers.iter().map(|n| n * 2).collect();\nprintln!(\"{doubled:?}\");",
    "if condition {\n    println!(\"Condition is true\");\n} else {\n    println!(\"Condition is false\");\n}",
    "fn fibonacci(n: u64) -> u64 {\n    if n <= 1 {\n        return n;\n    }\n    fibonacci(n - 1) + fibonacci(n - 2)\n}",
];

const COMMON_WORDS: &[&str] = &[
    "the", "be", "to", "of", "and", "a", "in", "that", "have", "I", "it", "for", "not", "on",
    "with", "he", "as", "you", "do", "at", "this", "but", "his", "by", "from", "they", "we",
    "say", "her", "she", "or", "an", "will", "my", "one", "all", "would", "there", "their",
    "what", "so", "up", "out", "if", "about", "who", "get", "which", "go", "me", "when", "make",
    "can", "like", "time", "no", "just", "him", "know", "take", "people", "into", "year",
    "your", "good", "some", "could", "them", "see", "other", "than", "then", "now", "look",
    "only", "come", "its", "over", "think", "also", "back", "after", "use", "two", "how",
    "our", "work", "first", "well", "way", "even", "new", "want", "because", "any", "these",
    "give", "day", "most", "us",
];

const RANDOM_CATEGORY_WORDS: usize = 40;
const FALLBACK_WORDS: usize = 30;

/// The categories with a dedicated generator
pub const TEXT_CATEGORIES: &[&str] = &["quotes", "code", "random"];

/// Generates a passage for the given category.
/// Unknown categories get a short run of random words.
pub fn generate_text(category: &str) -> String {
    let mut rng = thread_rng();

    match category {
        "quotes" => QUOTES.choose(&mut rng).unwrap_or(&QUOTES[0]).to_string(),
        "code" => CODE_SNIPPETS
            .choose(&mut rng)
            .unwrap_or(&CODE_SNIPPETS[0])
            .to_string(),
        "random" => random_words(RANDOM_CATEGORY_WORDS),
        _ => random_words(FALLBACK_WORDS),
    }
}

/// Joins `count` common words picked at random
pub fn random_words(count: usize) -> String {
    let mut rng = thread_rng();

    (0..count)
        .filter_map(|_| COMMON_WORDS.choose(&mut rng))
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}
