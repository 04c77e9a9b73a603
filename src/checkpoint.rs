//! Last-processed-id persistence between runs. One integer in a text
//! file: present means "resume after this id", absent means "start of
//! universe".

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

pub struct Checkpoint {
    path: PathBuf,
}

impl Checkpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// An absent file is a fresh run. Unparsable content is a loud error
    /// rather than a silent restart from zero.
    pub fn load(&self) -> Result<Option<u32>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("reading checkpoint {}", self.path.display()))?;
        let appid = text.trim().parse().with_context(|| {
            format!(
                "checkpoint {} is corrupt ({:?}); delete it to restart",
                self.path.display(),
                text.trim()
            )
        })?;
        Ok(Some(appid))
    }

    /// Record `appid` as the last fully-processed candidate. Only called
    /// once that candidate's outcome has reached the output table.
    pub fn store(&self, appid: u32) -> Result<()> {
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, format!("{appid}\n"))
            .with_context(|| format!("writing checkpoint {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing checkpoint {}", self.path.display()))?;
        Ok(())
    }

    /// Remove the checkpoint once the enumeration reaches the end of the
    /// universe.
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("removing checkpoint {}", self.path.display()))?;
        }
        Ok(())
    }
}

// ── Tests ──
