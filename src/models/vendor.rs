//! Sample vendor model. Publishes a scan report collected by an external
//! scanning collaborator as a fixed vendor tag followed by a JSON blob.
use crate::access::ModelIdentifier;
use crate::address::{Address, UnicastAddress};
use crate::mesh::{CompanyId, ModelId, APP_COMPANY_ID};
use crate::models::{Model, ModelConfig, ModelError, Outbound};
use crate::router::KeyHandle;
use core::time::Duration;
use slog::{debug, Logger};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const SAMPLE_VENDOR_MODEL: ModelId = ModelId(0x0001);
pub const SAMPLE_VENDOR_COMPANY: CompanyId = APP_COMPANY_ID;

/// Publication payload marker preceding the encoded scan report.
const SCAN_REPORT_TAG: u16 = 0xFFFF;
/// Periods below one second are not supported by this model; the stored
/// period is kept but no timer is armed.
const MIN_PERIOD_MS: u32 = 1000;

/// Parses a scan log produced by the external scanner. `[NEW]` lines map a
/// device address to its name; an `undefined` name is resolved through a
/// later `[CHG]` line for the same address, or the entry is dropped.
fn parse_scan_log(text: &str) -> BTreeMap<String, String> {
    let mut scanned = BTreeMap::new();
    for line in text.lines().filter(|l| l.contains("[NEW]")) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 || fields[1] != "Device" {
            continue;
        }
        let device = fields[2];
        let mut name = fields[3];
        if name == "undefined" {
            match text
                .lines()
                .filter(|l| l.contains("[CHG]"))
                .map(|l| l.split_whitespace().collect::<Vec<&str>>())
                .find(|f| f.len() >= 4 && f[2] == device)
            {
                Some(chg) => name = chg[3],
                None => continue,
            }
        }
        if name != "undefined" {
            scanned.insert(device.to_owned(), name.trim_end_matches(':').to_owned());
        }
    }
    scanned
}

pub struct VendorModel {
    config: ModelConfig,
    scan_path: PathBuf,
    report: Option<Vec<u8>>,
    log: Logger,
}
impl VendorModel {
    #[must_use]
    pub fn new(scan_path: PathBuf, log: Logger) -> VendorModel {
        VendorModel {
            config: ModelConfig::default(),
            scan_path,
            report: None,
            log,
        }
    }
    /// Loads and encodes the scan report. An unreadable or empty report is
    /// an error for this model only; the caller decides what to do with it.
    fn load_report(&mut self) -> Result<(), ModelError> {
        let text = std::fs::read_to_string(&self.scan_path)?;
        let scanned = parse_scan_log(&text);
        if scanned.is_empty() {
            return Err(ModelError::NoScanData {
                path: self.scan_path.clone(),
            });
        }
        debug!(self.log, "scan report loaded"; "devices" => scanned.len());
        self.report = Some(serde_json::to_vec(&scanned)?);
        Ok(())
    }
}
impl Model for VendorModel {
    fn identifier(&self) -> ModelIdentifier {
        ModelIdentifier::new_vendor(SAMPLE_VENDOR_MODEL, SAMPLE_VENDOR_COMPANY)
    }
    fn config(&self) -> &ModelConfig {
        &self.config
    }
    fn config_mut(&mut self) -> &mut ModelConfig {
        &mut self.config
    }
    fn process_message(
        &mut self,
        source: UnicastAddress,
        _destination: &Address,
        _key: KeyHandle,
        _payload: &[u8],
    ) -> Vec<Outbound> {
        debug!(self.log, "vendor message received"; "source" => %u16::from(source));
        Vec::new()
    }
    fn set_publication_period(&mut self, period_ms: u32) -> Result<(), ModelError> {
        self.config.publication_period_ms = period_ms;
        if period_ms == 0 || period_ms < MIN_PERIOD_MS {
            return Ok(());
        }
        self.load_report()
    }
    fn publication_period(&self) -> Option<Duration> {
        match self.config.publication_period_ms {
            ms if ms < MIN_PERIOD_MS => None,
            ms => Some(Duration::from_millis(u64::from(ms))),
        }
    }
    fn publish_payload(&mut self) -> Result<Option<Vec<u8>>, ModelError> {
        let report = self.report.as_ref().ok_or_else(|| ModelError::NoScanData {
            path: self.scan_path.clone(),
        })?;
        let mut payload = Vec::with_capacity(2 + report.len());
        payload.extend_from_slice(&SCAN_REPORT_TAG.to_be_bytes());
        payload.extend_from_slice(report);
        Ok(Some(payload))
    }
}
