use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, warn};

use super::super::domain::{DwellingType, Era, QualityTier, RenovationStatus};
use super::super::providers::{ComparableStore, LookupError};
use super::{Comparable, CommonPropertyReconciliation, DateRange, MultiUnitSale};

#[derive(Debug, thiserror::Error)]
pub enum ComparableImportError {
    #[error("unable to open comparables file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed comparables csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("row {line}: {reason}")]
    InvalidRow { line: usize, reason: String },
}

/// Common property found on a parent title while importing unit sales.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentReconciliation {
    pub parent_id: String,
    pub reconciliation: CommonPropertyReconciliation,
}

/// In-memory comparable store loaded from a sales export.
#[derive(Debug, Clone, Default)]
pub struct CsvComparableStore {
    comparables: Vec<Comparable>,
    reconciliations: Vec<ParentReconciliation>,
}

impl CsvComparableStore {
    pub fn from_comparables(comparables: Vec<Comparable>) -> Self {
        Self {
            comparables,
            reconciliations: Vec::new(),
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ComparableImportError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ComparableImportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self::from_reader(file)?;
        info!(
            path = %path.display(),
            comparables = store.comparables.len(),
            parents = store.reconciliations.len(),
            "comparables imported"
        );
        Ok(store)
    }

    /// Parses a sales export. Rows sharing a `parent_id` are reconciled against the parent
    /// title so each unit keeps only its own lot area.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ComparableImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut comparables = Vec::new();
        let mut parents: BTreeMap<String, MultiUnitSale> = BTreeMap::new();

        for (index, record) in csv_reader.deserialize::<SaleRow>().enumerate() {
            let line = index + 2;
            let row = record?;
            let parent = row.parent_id.clone().zip(row.parent_area_sqm);
            let comparable = row
                .into_comparable()
                .map_err(|reason| ComparableImportError::InvalidRow { line, reason })?;

            match parent {
                Some((parent_id, parent_area_sqm)) => parents
                    .entry(parent_id.clone())
                    .or_insert_with(|| MultiUnitSale {
                        parent_id,
                        parent_area_sqm,
                        units: Vec::new(),
                    })
                    .units
                    .push(comparable),
                None => comparables.push(comparable),
            }
        }

        let mut reconciliations = Vec::new();
        for (parent_id, sale) in parents {
            let (units, reconciliation) = sale.into_unit_comparables();
            if reconciliation.needs_review() {
                warn!(
                    parent = %parent_id,
                    common_property_sqm = reconciliation.common_property_sqm,
                    oversubscribed = reconciliation.oversubscribed,
                    "parent title area differs from its recorded lots"
                );
                reconciliations.push(ParentReconciliation {
                    parent_id,
                    reconciliation,
                });
            }
            comparables.extend(units);
        }

        Ok(Self {
            comparables,
            reconciliations,
        })
    }

    pub fn comparables(&self) -> &[Comparable] {
        &self.comparables
    }

    pub fn reconciliations(&self) -> &[ParentReconciliation] {
        &self.reconciliations
    }
}

#[async_trait]
impl ComparableStore for CsvComparableStore {
    async fn find(
        &self,
        suburb: &str,
        dwelling_type: DwellingType,
        range: DateRange,
    ) -> Result<Vec<Comparable>, LookupError> {
        let suburb = suburb.trim();
        Ok(self
            .comparables
            .iter()
            .filter(|comparable| suburb.is_empty() || comparable.suburb.eq_ignore_ascii_case(suburb))
            .filter(|comparable| comparable.dwelling_type == dwelling_type)
            .filter(|comparable| range.contains(comparable.sale_date))
            .cloned()
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct SaleRow {
    id: String,
    #[serde(default)]
    address: String,
    #[serde(default)]
    suburb: String,
    sale_price: String,
    sale_date: String,
    dwelling_type: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    land_size_sqm: Option<f64>,
    #[serde(default, deserialize_with = "empty_as_none")]
    building_area_sqm: Option<f64>,
    #[serde(default)]
    quality: String,
    #[serde(default)]
    era: String,
    #[serde(default)]
    renovation: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    parent_id: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    parent_area_sqm: Option<f64>,
}

impl SaleRow {
    fn into_comparable(self) -> Result<Comparable, String> {
        let sale_price = parse_money(&self.sale_price)
            .ok_or_else(|| format!("sale price '{}' is not a positive amount", self.sale_price))?;
        let sale_date = NaiveDate::parse_from_str(self.sale_date.trim(), "%Y-%m-%d")
            .map_err(|_| format!("sale date '{}' is not YYYY-MM-DD", self.sale_date))?;
        let dwelling_type = parse_dwelling_type(&self.dwelling_type)
            .ok_or_else(|| format!("unknown dwelling type '{}'", self.dwelling_type))?;

        Ok(Comparable {
            id: self.id,
            address: self.address,
            suburb: self.suburb,
            sale_price,
            sale_date,
            dwelling_type,
            land_size_sqm: self.land_size_sqm.filter(|area| *area > 0.0),
            building_area_sqm: self.building_area_sqm.filter(|area| *area > 0.0),
            quality: parse_quality(&self.quality),
            era: parse_era(&self.era),
            renovation: parse_renovation(&self.renovation),
        })
    }
}

fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| value.parse::<T>().ok()))
}

fn parse_money(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect();
    Decimal::from_str(&cleaned)
        .ok()
        .filter(|price| *price > Decimal::ZERO)
}

fn normalized(raw: &str) -> String {
    raw.trim()
        .to_ascii_lowercase()
        .replace(|c: char| c == ' ' || c == '-', "_")
}

fn parse_dwelling_type(raw: &str) -> Option<DwellingType> {
    match normalized(raw).as_str() {
        "house" | "detached" => Some(DwellingType::House),
        "townhouse" | "villa" | "dual_occ" => Some(DwellingType::Townhouse),
        "unit" | "apartment" | "flat" => Some(DwellingType::Unit),
        _ => None,
    }
}

fn parse_quality(raw: &str) -> QualityTier {
    match normalized(raw).as_str() {
        "basic" => QualityTier::Basic,
        "premium" => QualityTier::Premium,
        "luxury" => QualityTier::Luxury,
        _ => QualityTier::Standard,
    }
}

fn parse_era(raw: &str) -> Era {
    match normalized(raw).as_str() {
        "pre_1920" | "pre1920" | "victorian" | "edwardian" => Era::Pre1920,
        "interwar" => Era::Interwar,
        "post_war" | "postwar" => Era::PostWar,
        "late_20th_century" | "late20thcentury" => Era::Late20thCentury,
        "modern" => Era::Modern,
        "post_2010" | "post2010" => Era::Post2010,
        "new_build" | "new" => Era::NewBuild,
        _ => Era::Unknown,
    }
}

fn parse_renovation(raw: &str) -> RenovationStatus {
    match normalized(raw).as_str() {
        "renovated" | "yes" => RenovationStatus::Renovated,
        "unrenovated" | "original" | "no" => RenovationStatus::Unrenovated,
        _ => RenovationStatus::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = "\
id,address,suburb,sale_price,sale_date,dwelling_type,land_size_sqm,building_area_sqm,quality,era,renovation,parent_id,parent_area_sqm
s1,1 Oak St,Donvale,\"$1,650,000\",2025-02-10,House,720,210,standard,post war,renovated,,
s2,2/9 Elm Rd,Donvale,980000,2025-03-02,Townhouse,350,180,standard,new build,,P9,1000
s3,1/9 Elm Rd,Donvale,1010000,2025-03-20,Townhouse,400,185,standard,new build,,P9,1000
";

    #[test]
    fn import_reconciles_parent_titles() {
        let store = CsvComparableStore::from_reader(EXPORT.as_bytes()).expect("import");

        assert_eq!(store.comparables().len(), 3);
        let units: Vec<_> = store
            .comparables()
            .iter()
            .filter(|comparable| comparable.dwelling_type == DwellingType::Townhouse)
            .collect();
        assert!(units
            .iter()
            .all(|unit| unit.land_size_sqm == Some(350.0) || unit.land_size_sqm == Some(400.0)));

        let parents = store.reconciliations();
        assert_eq!(parents.len(), 1);
        assert_eq!(parents[0].parent_id, "P9");
        assert_eq!(parents[0].reconciliation.common_property_sqm, 250.0);
    }

    #[test]
    fn money_and_labels_are_parsed_leniently() {
        let store = CsvComparableStore::from_reader(EXPORT.as_bytes()).expect("import");
        let house = store
            .comparables()
            .iter()
            .find(|comparable| comparable.id == "s1")
            .expect("house row");

        assert_eq!(house.sale_price, Decimal::from(1_650_000));
        assert_eq!(house.era, Era::PostWar);
        assert_eq!(house.renovation, RenovationStatus::Renovated);
    }

    #[test]
    fn bad_dwelling_type_reports_line() {
        let raw = "id,sale_price,sale_date,dwelling_type\nx1,500000,2025-01-01,castle\n";
        match CsvComparableStore::from_reader(raw.as_bytes()) {
            Err(ComparableImportError::InvalidRow { line, reason }) => {
                assert_eq!(line, 2);
                assert!(reason.contains("castle"));
            }
            other => panic!("expected invalid row, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn find_filters_by_suburb_type_and_window() {
        let store = CsvComparableStore::from_reader(EXPORT.as_bytes()).expect("import");
        let range = DateRange {
            from: NaiveDate::from_ymd_opt(2025, 3, 1).expect("valid date"),
            to: NaiveDate::from_ymd_opt(2025, 3, 31).expect("valid date"),
        };

        let found = store
            .find("donvale", DwellingType::Townhouse, range)
            .await
            .expect("find");

        assert_eq!(found.len(), 2);
    }
}
