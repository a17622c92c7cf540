//! Candidate ID generation from a fixed word list.

use rand::seq::SliceRandom;

/// Number of words joined into one anonymized ID.
pub const WORDS_PER_ID: usize = 3;

/// Produces candidate anonymized IDs. Uniqueness is checked by the caller.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Draws `WORDS_PER_ID` random words from [`WORDS`] and joins them with `-`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WordListGenerator;

impl IdGenerator for WordListGenerator {
    fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..WORDS_PER_ID)
            .filter_map(|_| WORDS.choose(&mut rng).copied())
            .collect::<Vec<_>>()
            .join("-")
    }
}

pub static WORDS: &[&str] = &[
    "acorn", "adobe", "agate", "alder", "alloy", "amber", "anchor", "anvil", "apron",
    "arbor", "arch", "arrow", "aspen", "atlas", "attic", "autumn", "badge", "bagel",
    "balsa", "bamboo", "banjo", "barley", "barn", "basil", "basin", "beacon", "beaker",
    "beetle", "bellow", "birch", "bison", "blanket", "bloom", "bobcat", "bonnet",
    "boulder", "bramble", "brass", "breeze", "brick", "bridge", "brook", "broom", "bucket",
    "buckle", "bugle", "burrow", "cabin", "cactus", "camel", "candle", "canoe", "canyon",
    "carbon", "cargo", "carrot", "cedar", "cello", "chalk", "cherry", "chestnut", "chime",
    "cider", "cinder", "clover", "cobalt", "comet", "compass", "copper", "coral", "cotton",
    "cradle", "crane", "crater", "cricket", "crystal", "cypress", "daisy", "dapple",
    "delta", "denim", "desert", "dingo", "dolphin", "domino", "donkey", "dove", "dragon",
    "drizzle", "drum", "dune", "eagle", "easel", "ebony", "echo", "eclipse", "ember",
    "emerald", "engine", "ermine", "falcon", "fennel", "fern", "ferry", "fiddle", "fig",
    "flannel", "flint", "forest", "fossil", "fox", "galaxy", "garnet", "gazelle", "geyser",
    "ginger", "glacier", "globe", "goblet", "gopher", "granite", "gravel", "grove", "gull",
    "hammock", "harbor", "harvest", "hazel", "heron", "hickory", "hollow", "honey",
    "hornet", "husky", "iceberg", "igloo", "indigo", "iris", "island", "ivory", "jackal",
    "jasmine", "jasper", "jelly", "juniper", "kayak", "kelp", "kernel", "kettle", "kiwi",
    "koala", "ladder", "lagoon", "lantern", "larch", "lark", "lava", "lemon", "lentil",
    "lilac", "linen", "lobster", "locket", "lotus", "lynx", "magnet", "mango", "maple",
    "marble", "marsh", "meadow", "melon", "mesa", "meteor", "mink", "mitten", "mosaic",
    "moss", "muffin", "mural", "nectar", "nettle", "nickel", "nomad", "nutmeg", "oak",
    "oasis", "oat", "ocean", "olive", "onyx", "opal", "orbit", "orchid", "osprey", "otter",
    "oyster", "paddle", "pebble", "pelican", "pepper", "pigeon", "pine", "plank", "plum",
    "pollen", "poplar", "poppy", "prairie", "prism", "puffin", "pumpkin", "quail",
    "quarry", "quartz", "quill", "quilt", "radish", "raft", "raven", "reef", "ribbon",
    "ridge", "river", "robin", "rocket", "rowan", "ruby", "rye", "saddle", "saffron",
    "salmon", "sandal", "sapling", "satin", "sequoia", "shale", "shovel", "sierra",
    "silver", "sparrow", "spruce", "squash", "stable", "starling", "stone", "summit",
    "swallow", "sycamore", "talon", "tangle", "teapot", "thistle", "thunder", "timber",
    "topaz", "tulip", "tundra", "turnip", "tusk", "umber", "valley", "velvet", "violet",
    "walnut", "walrus", "willow", "wombat", "yarrow", "zephyr", "zinnia",
];
