use anyhow::{Context, Result, bail};
use rust_bert::resources::{RemoteResource, ResourceProvider};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

const EMBEDDED: &str = include_str!("../data/vader_lexicon.txt");
const CACHE_SUBDIR: &str = "vader-lexicon";

/// Published location of the full VADER lexicon.
pub const VADER_LEXICON_URL: &str =
    "https://raw.githubusercontent.com/cjhutto/vaderSentiment/master/vaderSentiment/vader_lexicon.txt";

/// Where the lexicon is read from at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexiconSource {
    /// Small subset bundled with the crate, for offline use.
    Embedded,
    File(PathBuf),
    /// Downloaded once and kept in the rust-bert resource cache.
    Remote(String),
}

impl Default for LexiconSource {
    fn default() -> Self {
        LexiconSource::Remote(VADER_LEXICON_URL.to_string())
    }
}

/// Token to mean valence mapping in the VADER lexicon format.
///
/// Each line holds `token<TAB>mean[<TAB>...]`; blank lines and `#` comments are skipped.
/// Tokens are stored lowercase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lexicon {
    valences: HashMap<String, f64>,
}

impl Lexicon {
    /// Lexicon bundled with the crate.
    pub fn embedded() -> Result<Self> {
        Self::parse(EMBEDDED).context("embedded lexicon is malformed")
    }

    /// Reads a lexicon file, e.g. the full `vader_lexicon.txt`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("cannot read lexicon file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("malformed lexicon file {}", path.display()))
    }

    /// Loads the lexicon from its source.
    ///
    /// Remote sources block on the download, so call this outside of the async runtime.
    pub fn load(source: &LexiconSource) -> Result<Self> {
        match source {
            LexiconSource::Embedded => Self::embedded(),
            LexiconSource::File(path) => Self::from_path(path),
            LexiconSource::Remote(url) => {
                let path = RemoteResource::new(url, CACHE_SUBDIR)
                    .get_local_path()
                    .with_context(|| format!("cannot download lexicon from {url}"))?;
                Self::from_path(path)
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut valences = HashMap::new();
        for (number, line) in content.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let mut columns = line.split('\t');
            let token = columns.next().unwrap_or_default().trim();
            let Some(mean) = columns.next() else {
                bail!("line {}: expected token and valence separated by a tab", number + 1);
            };
            if token.is_empty() {
                bail!("line {}: empty token", number + 1);
            }
            let mean: f64 = mean
                .trim()
                .parse()
                .with_context(|| format!("line {}: invalid valence {mean:?}", number + 1))?;
            valences.insert(token.to_lowercase(), mean);
        }
        Ok(Self { valences })
    }

    pub fn get(&self, token: &str) -> Option<f64> {
        self.valences.get(token).copied()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.valences.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.valences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.valences.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_should_load_embedded_lexicon() -> Result<()> {
        let lexicon = Lexicon::embedded()?;
        assert!(lexicon.len() > 200);
        assert_eq!(lexicon.get("good"), Some(1.9));
        assert_eq!(lexicon.get(":)"), Some(2.0));
        assert!(lexicon.get("table").is_none());
        Ok(())
    }

    #[test]
    fn it_should_parse_vader_lines() -> Result<()> {
        let lexicon = Lexicon::parse("# comment\n\nGreat\t3.1\t0.7\t[3, 3, 4]\nmeh\t-0.3\r\n")?;
        assert_eq!(lexicon.len(), 2);
        assert_eq!(lexicon.get("great"), Some(3.1));
        assert_eq!(lexicon.get("meh"), Some(-0.3));
        Ok(())
    }

    #[test]
    fn it_should_reject_malformed_lines() {
        let err = Lexicon::parse("good\t1.9\nbroken line\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));

        let err = Lexicon::parse("good\tvery\n").unwrap_err();
        assert!(err.to_string().contains("invalid valence"));
    }

    #[test]
    fn it_should_report_missing_files() {
        let err = Lexicon::from_path("/definitely/not/here.txt").unwrap_err();
        assert!(err.to_string().contains("cannot read lexicon file"));

        let err = Lexicon::load(&LexiconSource::File("/definitely/not/here.txt".into()))
            .unwrap_err();
        assert!(err.to_string().contains("cannot read lexicon file"));
    }

    #[test]
    fn it_should_default_to_the_full_published_lexicon() -> Result<()> {
        assert_eq!(
            LexiconSource::default(),
            LexiconSource::Remote(VADER_LEXICON_URL.to_string())
        );
        assert_eq!(Lexicon::load(&LexiconSource::Embedded)?, Lexicon::embedded()?);
        Ok(())
    }

    #[test]
    #[ignore = "downloads the full lexicon"]
    fn it_should_download_the_full_lexicon() -> Result<()> {
        let lexicon = Lexicon::load(&LexiconSource::default())?;
        assert!(lexicon.len() > 7000);
        assert_eq!(lexicon.get("lol"), Some(1.8));
        assert_eq!(lexicon.get("good"), Some(1.9));
        Ok(())
    }
}
