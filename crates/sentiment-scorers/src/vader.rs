//! Rule based valence scoring over a VADER lexicon.
//!
//! Tokenization and rules follow the NLTK flavour of VADER: single character tokens are
//! dropped, "no" is an ordinary lexicon word, and the idiom table is applied.

use crate::{
    LexiconScores, Scorer,
    lexicon::{Lexicon, LexiconSource},
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::{collections::HashSet, path::Path, sync::Arc};

const NAME: &str = "vader";

const B_INCR: f64 = 0.293;
const B_DECR: f64 = -0.293;
const C_INCR: f64 = 0.733;
const N_SCALAR: f64 = -0.74;
const NORMALIZE_ALPHA: f64 = 15.0;
const EXCLAMATION_WEIGHT: f64 = 0.292;
const MAX_EXCLAMATIONS: usize = 4;
const QUESTION_WEIGHT: f64 = 0.18;
const MAX_QUESTION_EMPHASIS: f64 = 0.96;

const NEGATIONS: &[&str] = &[
    "aint", "arent", "cannot", "cant", "couldnt", "darent", "didnt", "doesnt", "ain't", "aren't",
    "can't", "couldn't", "daren't", "didn't", "doesn't", "dont", "hadnt", "hasnt", "havent",
    "isnt", "mightnt", "mustnt", "neither", "don't", "hadn't", "hasn't", "haven't", "isn't",
    "mightn't", "mustn't", "neednt", "needn't", "never", "none", "nope", "nor", "not", "nothing",
    "nowhere", "oughtnt", "shant", "shouldnt", "uhuh", "wasnt", "werent", "oughtn't", "shan't",
    "shouldn't", "uh-uh", "wasn't", "weren't", "without", "wont", "wouldnt", "won't", "wouldn't",
    "rarely", "seldom", "despite",
];

const INCREMENTS: &[&str] = &[
    "absolutely", "amazingly", "awfully", "completely", "considerable", "considerably",
    "decidedly", "deeply", "effing", "enormous", "enormously", "entirely", "especially",
    "exceptional", "exceptionally", "extreme", "extremely", "fabulously", "flipping", "flippin",
    "frackin", "fracking", "fricking", "frickin", "frigging", "friggin", "fully", "fuckin",
    "fucking", "fuggin", "fugging", "greatly", "hella", "highly", "hugely", "incredible",
    "incredibly", "intensely", "major", "majorly", "more", "most", "particularly", "purely",
    "quite", "really", "remarkably", "so", "substantially", "thoroughly", "total", "totally",
    "tremendous", "tremendously", "uber", "unbelievably", "unusually", "utter", "utterly", "very",
];

const DECREMENTS: &[&str] = &[
    "almost", "barely", "hardly", "kind of", "kinda", "kindof", "kind-of", "less", "little",
    "marginal", "marginally", "occasional", "occasionally", "partly", "scarce", "scarcely",
    "slight", "slightly", "somewhat", "sort of", "sorta", "sortof", "sort-of",
];

const IDIOMS: &[(&str, f64)] = &[
    ("the shit", 3.0),
    ("the bomb", 3.0),
    ("bad ass", 1.5),
    ("yeah right", -2.0),
    ("cut the mustard", 2.0),
    ("kiss of death", -1.5),
    ("hand to mouth", -2.0),
];

// affixes stripped from a token when the rest is a word of the text
const PUNCTUATION: &[&str] = &[
    ".", "!", "?", ",", ";", ":", "-", "'", "\"", "!!", "!!!", "??", "???", "?!?", "!?!", "?!?!",
    "!?!?", "?!?!?", "!?!?!", "?!?!?!", "!?!?!?",
];

/// Lexicon and rule based sentiment scorer.
#[derive(Debug, Clone)]
pub struct VaderScorer {
    lexicon: Arc<Lexicon>,
}

impl VaderScorer {
    pub fn new(lexicon: Lexicon) -> Self {
        Self {
            lexicon: Arc::new(lexicon),
        }
    }

    /// Scorer over the lexicon bundled with the crate.
    pub fn embedded() -> Result<Self> {
        Ok(Self::new(Lexicon::embedded()?))
    }

    /// Scorer over a lexicon file in the VADER format.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Lexicon::from_path(path)?))
    }

    /// Loads the lexicon off the async runtime, since a remote source downloads it.
    pub async fn load(source: LexiconSource) -> Result<Self> {
        let lexicon = tokio::task::spawn_blocking(move || Lexicon::load(&source))
            .await
            .context("lexicon loader panicked")??;
        Ok(Self::new(lexicon))
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    /// Computes negative, neutral and positive proportions and the normalized compound score.
    pub fn polarity_scores(&self, text: &str) -> LexiconScores {
        let tokens = tokenize(text);
        let lower: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();
        let cap_differential = allcap_differential(&tokens);

        let mut sentiments = Vec::with_capacity(tokens.len());
        for (index, token) in tokens.iter().enumerate() {
            // a repeated token is scored in the context of its first occurrence
            let i = tokens.iter().position(|t| t == token).unwrap_or(index);
            let is_kind_of = lower[i] == "kind" && lower.get(i + 1).is_some_and(|n| n == "of");
            if booster(&lower[i]).is_some() || is_kind_of {
                sentiments.push(0.0);
                continue;
            }
            sentiments.push(self.valence(&tokens, &lower, i, cap_differential));
        }

        but_check(&lower, &mut sentiments);
        score_valence(&sentiments, text)
    }

    fn valence(&self, tokens: &[String], lower: &[String], i: usize, cap_differential: bool) -> f64 {
        let Some(mut valence) = self.lexicon.get(&lower[i]) else {
            return 0.0;
        };

        if is_upper(&tokens[i]) && cap_differential {
            valence += if valence > 0.0 { C_INCR } else { -C_INCR };
        }

        for start in 0..3 {
            if i > start && !self.lexicon.contains(&lower[i - start - 1]) {
                let mut scalar = scalar_inc_dec(
                    &tokens[i - start - 1],
                    &lower[i - start - 1],
                    valence,
                    cap_differential,
                );
                match start {
                    1 => scalar *= 0.95,
                    2 => scalar *= 0.9,
                    _ => {}
                }
                valence += scalar;
                valence = never_check(valence, tokens, start, i);
                if start == 2 {
                    valence = idioms_check(valence, tokens, i);
                }
            }
        }

        self.least_check(valence, lower, i)
    }

    fn least_check(&self, valence: f64, lower: &[String], i: usize) -> f64 {
        if i > 0 && lower[i - 1] == "least" && !self.lexicon.contains(&lower[i - 1]) {
            if i > 1 && matches!(lower[i - 2].as_str(), "at" | "very") {
                return valence;
            }
            return valence * N_SCALAR;
        }
        valence
    }
}

#[async_trait]
impl Scorer for VaderScorer {
    type Output = LexiconScores;

    async fn score(&self, text: &str) -> Result<LexiconScores> {
        Ok(self.polarity_scores(text))
    }

    fn name(&self) -> &'static str {
        NAME
    }
}

/// Splits on whitespace, drops single character tokens and strips one punctuation affix
/// from a token when what remains is a word of the text. Emoticons such as `:)` survive.
fn tokenize(text: &str) -> Vec<String> {
    let without_punctuation: String = text
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect();
    let words: HashSet<&str> = without_punctuation
        .split_whitespace()
        .filter(|word| word.chars().count() > 1)
        .collect();

    text.split_whitespace()
        .filter(|token| token.chars().count() > 1)
        .map(|token| strip_affix(token, &words).unwrap_or(token).to_owned())
        .collect()
}

fn strip_affix<'a>(token: &'a str, words: &HashSet<&str>) -> Option<&'a str> {
    PUNCTUATION.iter().find_map(|affix| {
        [token.strip_prefix(*affix), token.strip_suffix(*affix)]
            .into_iter()
            .flatten()
            .find(|word| words.contains(word))
    })
}

fn is_upper(token: &str) -> bool {
    token.chars().any(char::is_uppercase) && !token.chars().any(char::is_lowercase)
}

/// True when some, but not all, tokens are ALL CAPS.
fn allcap_differential(tokens: &[String]) -> bool {
    let caps = tokens.iter().filter(|t| is_upper(t)).count();
    caps > 0 && caps < tokens.len()
}

fn booster(lower: &str) -> Option<f64> {
    if INCREMENTS.contains(&lower) {
        Some(B_INCR)
    } else if DECREMENTS.contains(&lower) {
        Some(B_DECR)
    } else {
        None
    }
}

fn negated(token: &str) -> bool {
    let lower = token.to_lowercase();
    NEGATIONS.contains(&lower.as_str()) || lower.contains("n't")
}

fn idiom(sequence: &str) -> Option<f64> {
    IDIOMS
        .iter()
        .find(|(idiom, _)| *idiom == sequence)
        .map(|&(_, valence)| valence)
}

fn scalar_inc_dec(token: &str, lower: &str, valence: f64, cap_differential: bool) -> f64 {
    let Some(mut scalar) = booster(lower) else {
        return 0.0;
    };
    if valence < 0.0 {
        scalar = -scalar;
    }
    if is_upper(token) && cap_differential {
        scalar += if valence > 0.0 { C_INCR } else { -C_INCR };
    }
    scalar
}

/// Word matches are case sensitive here, only the negation lookup is not.
fn never_check(valence: f64, tokens: &[String], start: usize, i: usize) -> f64 {
    let before = |n: usize| tokens[i - n].as_str();
    let so_or_this = |w: &str| matches!(w, "so" | "this");
    match start {
        0 if negated(before(1)) => valence * N_SCALAR,
        1 if before(2) == "never" && so_or_this(before(1)) => valence * 1.25,
        1 if negated(before(2)) => valence * N_SCALAR,
        // "so" or "this" right before the word amplifies it with or without "never"
        2 if (before(3) == "never" && so_or_this(before(2))) || so_or_this(before(1)) => {
            valence * 1.25
        }
        2 if negated(before(3)) => valence * N_SCALAR,
        _ => valence,
    }
}

/// Replaces the valence of a word that is part of a known idiom and dampens it after a
/// two word booster such as "kind of".
fn idioms_check(valence: f64, tokens: &[String], i: usize) -> f64 {
    let t = |n: usize| tokens[n].as_str();
    let two_one = format!("{} {}", t(i - 2), t(i - 1));
    let three_two = format!("{} {}", t(i - 3), t(i - 2));
    let preceding = [
        format!("{} {}", t(i - 1), t(i)),
        format!("{} {} {}", t(i - 2), t(i - 1), t(i)),
        two_one.clone(),
        format!("{} {} {}", t(i - 3), t(i - 2), t(i - 1)),
        three_two.clone(),
    ];

    let mut valence = preceding
        .iter()
        .find_map(|sequence| idiom(sequence))
        .unwrap_or(valence);
    let following = [
        tokens.get(i + 1).map(|next| format!("{} {next}", t(i))),
        tokens
            .get(i + 1)
            .zip(tokens.get(i + 2))
            .map(|(next, after)| format!("{} {next} {after}", t(i))),
    ];
    for sequence in following.iter().flatten() {
        if let Some(idiom_valence) = idiom(sequence) {
            valence = idiom_valence;
        }
    }

    if booster(&three_two).is_some() || booster(&two_one).is_some() {
        valence += B_DECR;
    }
    valence
}

/// Dampens sentiment before "but" and emphasizes sentiment after it.
fn but_check(lower: &[String], sentiments: &mut [f64]) {
    let Some(but) = lower.iter().position(|w| w == "but") else {
        return;
    };
    for (index, sentiment) in sentiments.iter_mut().enumerate() {
        if index < but {
            *sentiment *= 0.5;
        } else if index > but {
            *sentiment *= 1.5;
        }
    }
}

fn punctuation_emphasis(text: &str) -> f64 {
    let exclamations = text.matches('!').count().min(MAX_EXCLAMATIONS) as f64 * EXCLAMATION_WEIGHT;
    let questions = match text.matches('?').count() {
        0 | 1 => 0.0,
        n @ 2..=3 => n as f64 * QUESTION_WEIGHT,
        _ => MAX_QUESTION_EMPHASIS,
    };
    exclamations + questions
}

fn normalize(score: f64) -> f64 {
    (score / (score * score + NORMALIZE_ALPHA).sqrt()).clamp(-1.0, 1.0)
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn score_valence(sentiments: &[f64], text: &str) -> LexiconScores {
    if sentiments.is_empty() {
        return LexiconScores {
            negative: 0.0,
            neutral: 0.0,
            positive: 0.0,
            compound: 0.0,
        };
    }

    let emphasis = punctuation_emphasis(text);
    let mut sum: f64 = sentiments.iter().sum();
    if sum > 0.0 {
        sum += emphasis;
    } else if sum < 0.0 {
        sum -= emphasis;
    }
    let compound = normalize(sum);

    let (mut positive, mut negative, mut neutral) = (0.0, 0.0, 0.0);
    for &s in sentiments {
        if s > 0.0 {
            positive += s + 1.0;
        } else if s < 0.0 {
            negative += s - 1.0;
        } else {
            neutral += 1.0;
        }
    }
    if positive > negative.abs() {
        positive += emphasis;
    } else if positive < negative.abs() {
        negative -= emphasis;
    }

    let total = positive + negative.abs() + neutral;
    LexiconScores {
        negative: round_to((negative / total).abs(), 3),
        neutral: round_to((neutral / total).abs(), 3),
        positive: round_to((positive / total).abs(), 3),
        compound: round_to(compound, 4),
    }
}
