//! Sequential enumeration driver shared by both run modes. One request in
//! flight at a time, pacing honored before every fetch, progress flushed
//! at fixed boundaries so a restart resumes instead of redoing work.

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::checkpoint::Checkpoint;
use crate::config::Config;
use crate::extract::{self, GameRow};
use crate::regions::REGIONS;
use crate::shutdown::{Cancelled, Shutdown};
use crate::steam::{AppEntry, DetailSource};
use crate::table::GameTable;

const FINAL_SAVE_HINT: &str =
    "final save failed; close any program holding the output file open and re-run";

/// Counters reported after a run.
#[derive(Debug, Default)]
pub struct CrawlStats {
    /// Candidates examined this run, skips included.
    pub processed: usize,
    pub rows_added: usize,
    pub skipped: usize,
    /// Candidates whose canonical fetch produced no data.
    pub no_data: usize,
    pub cancelled: bool,
    /// Crawl mode: the enumeration reached true end-of-universe.
    pub completed: bool,
}

pub struct Crawler<'a, S> {
    cfg: &'a Config,
    source: &'a S,
    shutdown: Shutdown,
}

impl<'a, S: DetailSource> Crawler<'a, S> {
    pub fn new(cfg: &'a Config, source: &'a S, shutdown: Shutdown) -> Self {
        Self {
            cfg,
            source,
            shutdown,
        }
    }

    /// Full-universe mode: resume from the last-id checkpoint, keep only
    /// VR-capable titles, checkpoint every `save_interval` candidates,
    /// clear the checkpoint at true end-of-universe.
    pub async fn run_universe(
        &self,
        universe: &[AppEntry],
        limit: Option<usize>,
        fresh: bool,
    ) -> Result<CrawlStats> {
        let checkpoint = Checkpoint::new(&self.cfg.checkpoint_file);
        if fresh {
            checkpoint.clear()?;
        }

        let mut table = GameTable::load(&self.cfg.output_file)?;
        self.backup_existing();

        let start = match checkpoint.load()? {
            Some(last_id) => {
                let index = resume_index(universe, last_id)?;
                info!(last_id, index, "resuming from checkpoint");
                index
            }
            None => 0,
        };

        let remaining = universe.len() - start;
        let span = limit.map_or(remaining, |n| n.min(remaining));
        info!(
            total = universe.len(),
            start,
            span,
            known_rows = table.len(),
            "starting catalog crawl"
        );

        let pb = progress_bar(span);
        let print_every = self.cfg.print_interval.max(1);
        let mut stats = CrawlStats::default();
        let mut last_processed = None;
        let mut since_checkpoint = 0usize;

        for app in &universe[start..start + span] {
            if self.shutdown.is_cancelled() {
                stats.cancelled = true;
                break;
            }

            if table.contains(app.appid) {
                stats.skipped += 1;
            } else {
                match self.crawl_row(app).await {
                    Ok(Some(row)) => {
                        if table.insert(row) {
                            stats.rows_added += 1;
                        }
                    }
                    Ok(None) => {}
                    Err(Cancelled) => {
                        stats.cancelled = true;
                        break;
                    }
                }
            }

            stats.processed += 1;
            last_processed = Some(app.appid);
            since_checkpoint += 1;
            pb.inc(1);

            if stats.processed % print_every == 0 {
                info!(
                    processed = stats.processed,
                    vr_rows = table.len(),
                    last_appid = app.appid,
                    last_name = %app.name,
                    "crawl progress"
                );
            }
            if since_checkpoint >= self.cfg.save_interval {
                since_checkpoint = 0;
                self.flush_with_checkpoint(&table, &checkpoint, app.appid);
            }
        }
        pb.finish_and_clear();

        table.save(&self.cfg.output_file).context(FINAL_SAVE_HINT)?;

        let reached_end = !stats.cancelled && start + span == universe.len();
        if reached_end {
            checkpoint.clear()?;
            info!(rows = table.len(), "end of universe reached, checkpoint cleared");
        } else if let Some(appid) = last_processed {
            checkpoint.store(appid)?;
            info!(last_appid = appid, rows = table.len(), "progress saved");
        }
        stats.completed = reached_end;
        Ok(stats)
    }

    /// List-driven mode: membership-based skip, a row for every processed
    /// candidate (sentinels included), full-table flush every
    /// `list_save_interval` appended rows. The table itself is the
    /// checkpoint; there is no last-id file.
    pub async fn run_list(&self, universe: &[AppEntry], limit: Option<usize>) -> Result<CrawlStats> {
        let mut table = GameTable::load(&self.cfg.output_file)?;
        self.backup_existing();
        info!(
            candidates = universe.len(),
            known_rows = table.len(),
            "starting list collection"
        );

        let pb = progress_bar(universe.len());
        let print_every = self.cfg.print_interval.max(1);
        let mut stats = CrawlStats::default();
        let mut since_flush = 0usize;

        for app in universe {
            if limit.is_some_and(|n| stats.processed >= n) {
                break;
            }
            if self.shutdown.is_cancelled() {
                stats.cancelled = true;
                break;
            }

            if table.contains(app.appid) {
                stats.skipped += 1;
                stats.processed += 1;
                pb.inc(1);
                continue;
            }

            let row = match self.list_row(app, &mut stats).await {
                Ok(row) => row,
                Err(Cancelled) => {
                    stats.cancelled = true;
                    break;
                }
            };
            if table.insert(row) {
                stats.rows_added += 1;
                since_flush += 1;
            }
            stats.processed += 1;
            pb.inc(1);

            if stats.processed % print_every == 0 {
                info!(
                    processed = stats.processed,
                    rows = table.len(),
                    last_appid = app.appid,
                    last_name = %app.name,
                    "list progress"
                );
            }
            if since_flush >= self.cfg.list_save_interval {
                since_flush = 0;
                // A locked output file must not kill the run; rows stay
                // in memory for the next flush attempt.
                if let Err(e) = table.save(&self.cfg.output_file) {
                    warn!(error = %e, "could not flush output table, continuing in memory");
                }
            }
        }
        pb.finish_and_clear();

        table.save(&self.cfg.output_file).context(FINAL_SAVE_HINT)?;
        stats.completed = !stats.cancelled;
        Ok(stats)
    }

    /// Canonical fetch for the full-universe walk. Only a candidate
    /// positively identified as VR-capable produces a row here; one that
    /// cannot be fetched cannot be identified and is passed over.
    async fn crawl_row(&self, app: &AppEntry) -> Result<Option<GameRow>, Cancelled> {
        self.shutdown.delay(self.cfg.request_interval()).await?;
        let details = match self
            .source
            .app_details(app.appid, &self.cfg.canonical_region)
            .await?
        {
            Some(details) => details,
            None => return Ok(None),
        };
        if !extract::has_vr_support(&details) && !extract::is_vr_exclusive(&details) {
            return Ok(None);
        }

        let mut row = GameRow::sentinel(app.appid, &app.name);
        row.apply_details(&details);
        if details.is_free {
            row.mark_free();
        } else {
            self.fill_listed_prices(&mut row).await?;
        }
        Ok(Some(row))
    }

    /// Canonical fetch for the list walk: every candidate yields a row,
    /// down to a fully-sentinel one when the fetch produces nothing.
    async fn list_row(&self, app: &AppEntry, stats: &mut CrawlStats) -> Result<GameRow, Cancelled> {
        self.shutdown.delay(self.cfg.request_interval()).await?;
        let details = self
            .source
            .app_details(app.appid, &self.cfg.canonical_region)
            .await?;

        let mut row = GameRow::sentinel(app.appid, &app.name);
        match &details {
            Some(d) => row.apply_details(d),
            None => {
                stats.no_data += 1;
                warn!(appid = app.appid, name = %app.name, "no canonical data, row will carry sentinels");
            }
        }

        if details.as_ref().is_some_and(|d| d.is_free) {
            row.mark_free();
        } else {
            self.fill_listed_prices(&mut row).await?;
        }
        Ok(row)
    }

    /// One paced fetch per supported region. A missing or failed regional
    /// fetch leaves that region's sentinel in place rather than dropping
    /// the row.
    async fn fill_listed_prices(&self, row: &mut GameRow) -> Result<(), Cancelled> {
        for (country, currency) in REGIONS {
            self.shutdown.delay(self.cfg.request_interval()).await?;
            let regional = self.source.app_details(row.appid, country).await?;
            row.set_price(currency, extract::region_price(regional.as_ref()));
        }
        Ok(())
    }

    fn backup_existing(&self) {
        match GameTable::backup(&self.cfg.output_file, &self.cfg.backup_dir) {
            Ok(Some(dest)) => info!(backup = %dest.display(), "backed up existing table"),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "could not back up existing table"),
        }
    }

    /// Periodic crawl-mode checkpoint: flush first, and only advance the
    /// last-id record past rows that actually reached disk.
    fn flush_with_checkpoint(&self, table: &GameTable, checkpoint: &Checkpoint, appid: u32) {
        if let Err(e) = table.save(&self.cfg.output_file) {
            warn!(error = %e, "could not flush output table, continuing in memory");
            return;
        }
        if let Err(e) = checkpoint.store(appid) {
            warn!(error = %e, "could not write checkpoint");
        } else {
            info!(last_appid = appid, rows = table.len(), "progress saved");
        }
    }
}

/// Locate the candidate strictly after `last_id` in universe order. A
/// checkpointed id missing from a freshly fetched universe aborts the run
/// rather than guessing a resume point.
pub fn resume_index(universe: &[AppEntry], last_id: u32) -> Result<usize> {
    match universe.iter().position(|app| app.appid == last_id) {
        Some(index) => Ok(index + 1),
        None => bail!(
            "checkpointed app id {} is no longer in the app list; \
             delete the checkpoint file or re-run with --fresh to restart",
            last_id
        ),
    }
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
            .unwrap()
            .progress_chars("=> "),
    );
    pb
}

// ── Tests ──
