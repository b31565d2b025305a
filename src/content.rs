/// A (subject, clue) pair drawn for a round. The subject is the secret word
/// civilians see; the clue is the weaker hint optionally shown to the
/// impostor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordPair {
    pub subject: String,
    pub clue: String,
}

/// Source of round content. The game core only ever asks for a random pair
/// for a topic and whether a topic has entries at all; where the table lives
/// is the provider's business.
pub trait ContentSource: Send + Sync {
    fn draw(&self, topic: &str) -> Option<WordPair>;

    fn has_entries(&self, topic: &str) -> bool {
        self.draw(topic).is_some()
    }
}

/// Built-in fixed tables, keyed by topic identifier.
pub struct BuiltinContent;

const ANIMALS: &[(&str, &str)] = &[
    ("otter", "swims on its back"),
    ("giraffe", "needs no ladder"),
    ("penguin", "dresses formally"),
    ("chameleon", "hard to pin down"),
    ("owl", "works the night shift"),
    ("kangaroo", "carries hand luggage"),
];

const FOOD: &[(&str, &str)] = &[
    ("croissant", "flaky and buttery"),
    ("ramen", "slurping encouraged"),
    ("taco", "folds under pressure"),
    ("risotto", "needs constant stirring"),
    ("pretzel", "tied in knots"),
];

const PLACES: &[(&str, &str)] = &[
    ("lighthouse", "keeps others off the rocks"),
    ("library", "quiet please"),
    ("airport", "arrivals and departures"),
    ("greenhouse", "always humid"),
    ("observatory", "best on clear nights"),
];

fn entries_for(topic: &str) -> Option<&'static [(&'static str, &'static str)]> {
    match topic {
        "animals" => Some(ANIMALS),
        "food" => Some(FOOD),
        "places" => Some(PLACES),
        _ => None,
    }
}

impl ContentSource for BuiltinContent {
    fn draw(&self, topic: &str) -> Option<WordPair> {
        use rand::Rng;
        let entries = entries_for(topic)?;
        if entries.is_empty() {
            return None;
        }
        let (subject, clue) = entries[rand::rng().random_range(0..entries.len())];
        Some(WordPair {
            subject: subject.to_string(),
            clue: clue.to_string(),
        })
    }

    fn has_entries(&self, topic: &str) -> bool {
        entries_for(topic).is_some_and(|e| !e.is_empty())
    }
}

/// Test-only provider returning one fixed pair for every topic. Lives here so
/// both unit and integration tests can share it.
pub struct FixedContent {
    pub pair: WordPair,
}

impl FixedContent {
    pub fn new(subject: &str, clue: &str) -> Self {
        Self {
            pair: WordPair {
                subject: subject.to_string(),
                clue: clue.to_string(),
            },
        }
    }
}

impl ContentSource for FixedContent {
    fn draw(&self, _topic: &str) -> Option<WordPair> {
        Some(self.pair.clone())
    }
}
