//! The persisted result set: an ordered in-memory mapping keyed by appid,
//! loaded wholesale from CSV, appended to, and flushed wholesale with
//! write-new-then-replace semantics so a failed save never corrupts what
//! already reached disk.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Local;

use crate::extract::{GameRow, RegionPrice};
use crate::regions::REGIONS;
use crate::steam::AppEntry;

// External vocabulary of the table. Kept byte-compatible with the
// datasets produced by earlier collector versions.
const NA: &str = "N/A";
const FREE: &str = "Free";
const TRUE_TOKEN: &str = "TRUE";
const FALSE_TOKEN: &str = "FALSE";

const BASE_COLUMNS: [&str; 15] = [
    "AppID",
    "GameName",
    "IsVRSupported",
    "IsVRExclusive",
    "MetacriticScore",
    "TotalReviews",
    "ReleaseDate",
    "Developer",
    "Publisher",
    "Genres",
    "Categories",
    "PlatformWindows",
    "PlatformMac",
    "PlatformLinux",
    "Achievements",
];

#[derive(Debug, Default)]
pub struct GameTable {
    rows: BTreeMap<u32, GameRow>,
}

impl GameTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the persisted table if present; a missing file is an empty set.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("opening output table {}", path.display()))?;

        let got = reader.headers()?.clone();
        let want = headers();
        if got.iter().ne(want.iter().map(|h| h.as_str())) {
            bail!(
                "output table {} has an unrecognized column layout; \
                 move it aside to start a fresh collection",
                path.display()
            );
        }

        let mut rows = BTreeMap::new();
        for record in reader.records() {
            let record = record.context("reading output table row")?;
            let row = parse_record(&record)
                .with_context(|| format!("malformed row in {}", path.display()))?;
            rows.insert(row.appid, row);
        }
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, appid: u32) -> bool {
        self.rows.contains_key(&appid)
    }

    pub fn rows(&self) -> impl Iterator<Item = &GameRow> {
        self.rows.values()
    }

    /// Append-only insert: an existing row wins and the new one is
    /// dropped, so replays can never duplicate or rewrite history.
    pub fn insert(&mut self, row: GameRow) -> bool {
        match self.rows.entry(row.appid) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(row);
                true
            }
        }
    }

    /// Serialize the whole table to a sibling temp file, then rename over
    /// the target. An interrupted or failed save leaves the previous file
    /// intact.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)
                    .with_context(|| format!("creating output directory {}", dir.display()))?;
            }
        }
        let tmp = path.with_extension("tmp");
        {
            let mut writer = csv::Writer::from_path(&tmp)
                .with_context(|| format!("creating {}", tmp.display()))?;
            writer.write_record(headers())?;
            for row in self.rows.values() {
                writer.write_record(to_record(row))?;
            }
            writer.flush().context("flushing output table")?;
        }
        fs::rename(&tmp, path)
            .with_context(|| format!("replacing output table {}", path.display()))?;
        Ok(())
    }

    /// Timestamped copy of the persisted table into `dir`, taken before
    /// the first overwrite of a run. Returns the backup path, or None if
    /// there is nothing to back up yet.
    pub fn backup(path: &Path, dir: &Path) -> Result<Option<PathBuf>> {
        if !path.exists() {
            return Ok(None);
        }
        fs::create_dir_all(dir)
            .with_context(|| format!("creating backup directory {}", dir.display()))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("output.csv");
        let stamped = format!("{}_{}", Local::now().format("%Y%m%d_%H%M%S"), file_name);
        let dest = dir.join(stamped);
        fs::copy(path, &dest)
            .with_context(|| format!("writing backup {}", dest.display()))?;
        Ok(Some(dest))
    }
}

/// Full column set: the base fields, then three price columns per region
/// in `REGIONS` order.
pub fn headers() -> Vec<String> {
    let mut cols: Vec<String> = BASE_COLUMNS.iter().map(|c| c.to_string()).collect();
    for (_, currency) in REGIONS {
        cols.push(format!("FinalPrice_{currency}"));
        cols.push(format!("OriginalPrice_{currency}"));
        cols.push(format!("Discount%_{currency}"));
    }
    cols
}

fn to_record(row: &GameRow) -> Vec<String> {
    let mut rec = vec![
        row.appid.to_string(),
        row.name.clone(),
        tri_state(row.vr_supported),
        tri_state(row.vr_exclusive),
        opt_num(row.metacritic_score),
        opt_num(row.total_reviews),
        opt_text(&row.release_date),
        opt_text(&row.developers),
        opt_text(&row.publishers),
        opt_text(&row.genres),
        opt_text(&row.categories),
        tri_state(row.platform_windows),
        tri_state(row.platform_mac),
        tri_state(row.platform_linux),
        opt_num(row.achievements),
    ];
    for (_, currency) in REGIONS {
        let price = row
            .prices
            .get(currency)
            .unwrap_or(&RegionPrice::Unavailable);
        rec.extend(price_cells(price));
    }
    rec
}

fn parse_record(rec: &csv::StringRecord) -> Result<GameRow> {
    let get = |i: usize| rec.get(i).unwrap_or_default();

    let appid: u32 = get(0)
        .trim()
        .parse()
        .with_context(|| format!("bad AppID value {:?}", get(0)))?;
    let mut row = GameRow::sentinel(appid, get(1));

    row.vr_supported = parse_tri_state(get(2));
    row.vr_exclusive = parse_tri_state(get(3));
    row.metacritic_score = parse_opt_num(get(4));
    row.total_reviews = parse_opt_num(get(5));
    row.release_date = parse_opt_text(get(6));
    row.developers = parse_opt_text(get(7));
    row.publishers = parse_opt_text(get(8));
    row.genres = parse_opt_text(get(9));
    row.categories = parse_opt_text(get(10));
    row.platform_windows = parse_tri_state(get(11));
    row.platform_mac = parse_tri_state(get(12));
    row.platform_linux = parse_tri_state(get(13));
    row.achievements = parse_opt_num(get(14));

    let mut col = BASE_COLUMNS.len();
    for (_, currency) in REGIONS {
        let price = parse_price(get(col), get(col + 1), get(col + 2));
        row.set_price(currency, price);
        col += 3;
    }
    Ok(row)
}

fn price_cells(price: &RegionPrice) -> [String; 3] {
    match price {
        RegionPrice::Free => [FREE.into(), FREE.into(), "0".into()],
        RegionPrice::Unavailable => [NA.into(), NA.into(), NA.into()],
        RegionPrice::Listed {
            final_price,
            initial_price,
            discount_percent,
        } => [
            opt_text(final_price),
            opt_text(initial_price),
            opt_num(*discount_percent),
        ],
    }
}

fn parse_price(final_leg: &str, initial_leg: &str, discount_leg: &str) -> RegionPrice {
    if final_leg == FREE && initial_leg == FREE {
        return RegionPrice::Free;
    }
    if final_leg == NA && initial_leg == NA && discount_leg == NA {
        return RegionPrice::Unavailable;
    }
    RegionPrice::Listed {
        final_price: parse_opt_text(final_leg),
        initial_price: parse_opt_text(initial_leg),
        discount_percent: discount_leg.trim().parse().ok(),
    }
}

fn tri_state(v: Option<bool>) -> String {
    match v {
        Some(true) => TRUE_TOKEN.into(),
        Some(false) => FALSE_TOKEN.into(),
        None => NA.into(),
    }
}

fn parse_tri_state(s: &str) -> Option<bool> {
    match s {
        TRUE_TOKEN => Some(true),
        FALSE_TOKEN => Some(false),
        _ => None,
    }
}

fn opt_num(v: Option<i64>) -> String {
    v.map(|n| n.to_string()).unwrap_or_else(|| NA.into())
}

fn parse_opt_num(s: &str) -> Option<i64> {
    if s == NA {
        None
    } else {
        s.trim().parse().ok()
    }
}

fn opt_text(v: &Option<String>) -> String {
    v.clone().unwrap_or_else(|| NA.into())
}

fn parse_opt_text(s: &str) -> Option<String> {
    if s == NA {
        None
    } else {
        Some(s.to_string())
    }
}

/// Read a caller-supplied ordered universe: two named columns, row order
/// is processing order. Accepts both the `AppID`/`GameName` spellings and
/// the `App ID`/`Game Name` variants older datasets carry.
pub fn load_universe(path: &Path) -> Result<Vec<AppEntry>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening input table {}", path.display()))?;
    let headers = reader.headers()?.clone();

    let find = |names: [&str; 2]| headers.iter().position(|h| names.contains(&h.trim()));
    let id_col = find(["AppID", "App ID"])
        .with_context(|| format!("{} is missing an AppID column", path.display()))?;
    let name_col = find(["GameName", "Game Name"])
        .with_context(|| format!("{} is missing a GameName column", path.display()))?;

    let mut apps = Vec::new();
    for record in reader.records() {
        let record = record.context("reading input table row")?;
        let raw_id = record.get(id_col).unwrap_or_default().trim();
        if raw_id.is_empty() {
            continue;
        }
        let appid = raw_id
            .parse()
            .with_context(|| format!("bad app id {:?} in {}", raw_id, path.display()))?;
        apps.push(AppEntry {
            appid,
            name: record.get(name_col).unwrap_or_default().to_string(),
        });
    }
    Ok(apps)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::GameRow;
    use std::fs;

    fn sample_row(appid: u32) -> GameRow {
        let mut row = GameRow::sentinel(appid, "Half-Life: Alyx");
        row.vr_supported = Some(true);
        row.vr_exclusive = Some(false);
        row.metacritic_score = Some(93);
        row.developers = Some("Valve".into());
        row.platform_windows = Some(true);
        row.platform_linux = Some(false);
        row.set_price(
            "USD",
            RegionPrice::Listed {
                final_price: Some("$59.99".into()),
                initial_price: Some("$59.99".into()),
                discount_percent: Some(0),
            },
        );
        row.set_price("GBP", RegionPrice::Free);
        row
    }

    #[test]
    fn save_and_load_round_trip_preserves_tri_states() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");

        let mut table = GameTable::new();
        table.insert(sample_row(546560));
        table.insert(GameRow::sentinel(99, "Unreachable"));
        table.save(&path).unwrap();

        let loaded = GameTable::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);

        let back = loaded.rows().find(|r| r.appid == 546560).unwrap();
        assert_eq!(back, &sample_row(546560));

        let ghost = loaded.rows().find(|r| r.appid == 99).unwrap();
        assert_eq!(ghost.vr_supported, None);
        assert!(ghost
            .prices
            .values()
            .all(|p| *p == RegionPrice::Unavailable));
    }

    #[test]
    fn serialized_tokens_match_the_external_vocabulary() {
        let rec = to_record(&sample_row(546560));
        assert_eq!(rec[0], "546560");
        assert_eq!(rec[2], "TRUE");
        assert_eq!(rec[3], "FALSE");
        assert_eq!(rec[4], "93");
        assert_eq!(rec[5], "N/A");
        assert_eq!(rec[13], "FALSE");

        let cols = headers();
        let usd_final = cols.iter().position(|c| c == "FinalPrice_USD").unwrap();
        assert_eq!(rec[usd_final], "$59.99");

        let gbp_final = cols.iter().position(|c| c == "FinalPrice_GBP").unwrap();
        assert_eq!(rec[gbp_final], "Free");
        assert_eq!(rec[gbp_final + 2], "0");

        let eur_final = cols.iter().position(|c| c == "FinalPrice_EUR").unwrap();
        assert_eq!(rec[eur_final], "N/A");
        assert_eq!(rec.len(), cols.len());
    }

    #[test]
    fn insert_is_append_only() {
        let mut table = GameTable::new();
        assert!(table.insert(sample_row(1)));
        let mut changed = sample_row(1);
        changed.name = "Renamed".into();
        assert!(!table.insert(changed));
        assert_eq!(table.rows().next().unwrap().name, "Half-Life: Alyx");
    }

    #[test]
    fn missing_file_loads_empty_and_save_replaces_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");

        let empty = GameTable::load(&path).unwrap();
        assert!(empty.is_empty());

        let mut table = GameTable::new();
        table.insert(sample_row(1));
        table.save(&path).unwrap();
        table.insert(sample_row(2));
        table.save(&path).unwrap();

        assert!(!path.with_extension("tmp").exists());
        assert_eq!(GameTable::load(&path).unwrap().len(), 2);
    }

    #[test]
    fn unrecognized_layout_is_a_loud_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        fs::write(&path, "Something,Else\n1,2\n").unwrap();
        assert!(GameTable::load(&path).is_err());
    }

    #[test]
    fn universe_accepts_both_header_spellings() {
        let dir = tempfile::tempdir().unwrap();

        let modern = dir.path().join("modern.csv");
        fs::write(&modern, "AppID,GameName\n10,Alpha\n20,Beta\n").unwrap();
        let apps = load_universe(&modern).unwrap();
        assert_eq!(apps.len(), 2);
        assert_eq!(apps[0].appid, 10);
        assert_eq!(apps[1].name, "Beta");

        let legacy = dir.path().join("legacy.csv");
        fs::write(&legacy, "App ID,Game Name\n30,Gamma\n").unwrap();
        let apps = load_universe(&legacy).unwrap();
        assert_eq!(apps[0].appid, 30);
        assert_eq!(apps[0].name, "Gamma");
    }

    #[test]
    fn backup_copies_with_a_timestamped_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let backups = dir.path().join("backups");

        assert_eq!(GameTable::backup(&path, &backups).unwrap(), None);

        let mut table = GameTable::new();
        table.insert(sample_row(1));
        table.save(&path).unwrap();

        let dest = GameTable::backup(&path, &backups).unwrap().unwrap();
        assert!(dest.starts_with(&backups));
        assert!(dest
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .ends_with("out.csv"));
        assert_eq!(GameTable::load(&dest).unwrap().len(), 1);
    }
}
