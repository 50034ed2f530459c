//! `nvidia-smi` backend.
//!
//! Runs `nvidia-smi --query-gpu=<columns> --format=csv,nounits` once per
//! scrape and serves every device field from the resulting table.

use std::process::Command;

use csv::ByteRecord;
use tracing::{debug, trace};

use crate::backend::{DeviceIdentity, DeviceQuery, GpuBackend, MemoryInfo};
use crate::error::{BackendError, QueryError};

const NAME: &str = "nvidia-smi";

/// Default command run by the backend.
pub const DEFAULT_COMMAND: &str = "nvidia-smi";

/// Columns requested from `nvidia-smi`, in request order.
pub const QUERY_COLUMNS: [&str; 14] = [
    "name",
    "index",
    "uuid",
    "fan.speed",
    "temperature.gpu",
    "clocks.gr",
    "clocks.sm",
    "clocks.mem",
    "power.draw",
    "utilization.gpu",
    "utilization.memory",
    "memory.total",
    "memory.free",
    "memory.used",
];

const MIB: f64 = 1024.0 * 1024.0;
const MILLIWATTS_PER_WATT: f64 = 1000.0;

/// Backend that shells out to `nvidia-smi`.
#[derive(Debug, Clone)]
pub struct SmiBackend {
    command: String,
}

impl SmiBackend {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    fn run(&self) -> Result<Vec<u8>, BackendError> {
        let output = Command::new(&self.command)
            .arg(format!("--query-gpu={}", QUERY_COLUMNS.join(",")))
            .arg("--format=csv,nounits")
            .output()
            .map_err(|source| BackendError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(BackendError::CommandFailed {
                command: self.command.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        trace!(bytes = output.stdout.len(), "nvidia-smi output received");
        Ok(output.stdout)
    }
}

impl Default for SmiBackend {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND)
    }
}

impl GpuBackend for SmiBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn query(&self) -> Result<Box<dyn DeviceQuery + '_>, BackendError> {
        let output = self.run()?;
        Ok(Box::new(SmiTable::parse(&output)?))
    }
}

/// Position of each requested column in the output rows.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ColumnMap {
    positions: [usize; QUERY_COLUMNS.len()],
}

impl ColumnMap {
    /// Locate every requested column in a header row by name.
    fn from_header(header: &ByteRecord) -> Result<Self, BackendError> {
        let names: Vec<&str> = header.iter().map(header_name).collect();
        let mut positions = [0; QUERY_COLUMNS.len()];

        for (slot, column) in positions.iter_mut().zip(QUERY_COLUMNS) {
            *slot = names
                .iter()
                .position(|name| *name == column)
                .ok_or(BackendError::MissingColumn(column))?;
        }

        Ok(Self { positions })
    }

    /// Assume the requested column order for a header-less table.
    fn positional(width: usize) -> Result<Self, BackendError> {
        if width != QUERY_COLUMNS.len() {
            return Err(BackendError::ColumnCount {
                expected: QUERY_COLUMNS.len(),
                actual: width,
            });
        }

        let mut positions = [0; QUERY_COLUMNS.len()];
        for (i, slot) in positions.iter_mut().enumerate() {
            *slot = i;
        }
        Ok(Self { positions })
    }

    fn position(&self, column: &str) -> Option<usize> {
        QUERY_COLUMNS
            .iter()
            .position(|c| *c == column)
            .map(|i| self.positions[i])
    }
}

/// Reduce a header cell to the name it was requested under.
///
/// `nvidia-smi` appends a ` [unit]` suffix (`memory.used [MiB]`) and prints
/// clock columns under their long names (`clocks.current.graphics`).
fn normalize_header(cell: &str) -> &str {
    let name = match cell.find('[') {
        Some(pos) => cell[..pos].trim(),
        None => cell.trim(),
    };

    match name {
        "clocks.current.graphics" => "clocks.gr",
        "clocks.current.sm" => "clocks.sm",
        "clocks.current.memory" => "clocks.mem",
        other => other,
    }
}

/// Header name of a raw cell. Cells that are not UTF-8 match no column.
fn header_name(cell: &[u8]) -> &str {
    std::str::from_utf8(cell).map_or("", normalize_header)
}

fn is_header(record: &ByteRecord) -> bool {
    record
        .iter()
        .any(|cell| QUERY_COLUMNS.contains(&header_name(cell)))
}

/// Parsed `nvidia-smi` table for one scrape. Each row is one device.
#[derive(Debug, Clone)]
pub struct SmiTable {
    columns: ColumnMap,
    rows: Vec<ByteRecord>,
}

impl SmiTable {
    /// Parse CSV output, with or without a header row.
    ///
    /// A malformed table or a header lacking a requested column is an error
    /// for the whole scrape. Bad individual cells, including cells that are
    /// not UTF-8, are reported later per field.
    pub fn parse(output: &[u8]) -> Result<Self, BackendError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(csv::Trim::All)
            .from_reader(output);

        let mut rows = reader
            .byte_records()
            .collect::<Result<Vec<ByteRecord>, csv::Error>>()?;

        let columns = if rows.first().is_some_and(is_header) {
            let header = rows.remove(0);
            ColumnMap::from_header(&header)?
        } else {
            let width = rows.first().map_or(QUERY_COLUMNS.len(), ByteRecord::len);
            ColumnMap::positional(width)?
        };

        debug!(devices = rows.len(), "Parsed nvidia-smi table");
        Ok(Self { columns, rows })
    }

    fn cell(&self, index: u32, column: &'static str) -> Result<&str, QueryError> {
        let row = self
            .rows
            .get(index as usize)
            .ok_or(QueryError::NoSuchDevice { index })?;

        let bytes = self
            .columns
            .position(column)
            .and_then(|pos| row.get(pos))
            .ok_or_else(|| QueryError::unavailable(column, "column not present"))?;

        std::str::from_utf8(bytes).map_err(|_| QueryError::unavailable(column, "not valid UTF-8"))
    }

    /// A text cell that must carry a real value.
    fn text(&self, index: u32, column: &'static str) -> Result<String, QueryError> {
        let value = self.cell(index, column)?;
        if value.is_empty() || value.starts_with('[') {
            return Err(QueryError::unavailable(column, value));
        }
        Ok(value.to_string())
    }

    fn number(&self, index: u32, column: &'static str) -> Result<f64, QueryError> {
        let value = self.cell(index, column)?;
        if value.is_empty() || value.starts_with('[') {
            return Err(QueryError::unavailable(column, value));
        }

        value.parse::<f64>().map_err(|source| QueryError::Parse {
            field: column,
            value: value.to_string(),
            source,
        })
    }
}

impl DeviceQuery for SmiTable {
    fn device_count(&self) -> Result<u32, QueryError> {
        Ok(self.rows.len() as u32)
    }

    fn device_identity(&self, index: u32) -> Result<DeviceIdentity, QueryError> {
        Ok(DeviceIdentity {
            minor_number: self.text(index, "index")?,
            uuid: self.text(index, "uuid")?,
            name: self.text(index, "name")?,
        })
    }

    fn device_memory(&self, index: u32) -> Result<MemoryInfo, QueryError> {
        let used = self.number(index, "memory.used");
        let total = self.number(index, "memory.total");

        match (used, total) {
            (Err(e), Err(_)) => Err(e),
            (used, total) => {
                if let Err(e) = &used {
                    debug!(device = index, error = %e, "memory.used unavailable");
                }
                if let Err(e) = &total {
                    debug!(device = index, error = %e, "memory.total unavailable");
                }

                Ok(MemoryInfo {
                    used_bytes: used.ok().map(|mib| mib * MIB),
                    total_bytes: total.ok().map(|mib| mib * MIB),
                })
            }
        }
    }

    fn device_utilization(&self, index: u32) -> Result<f64, QueryError> {
        self.number(index, "utilization.gpu")
    }

    fn device_power(&self, index: u32) -> Result<f64, QueryError> {
        self.number(index, "power.draw").map(|watts| watts * MILLIWATTS_PER_WATT)
    }

    fn device_temperature(&self, index: u32) -> Result<f64, QueryError> {
        self.number(index, "temperature.gpu")
    }

    fn device_fan_speed(&self, index: u32) -> Result<f64, QueryError> {
        self.number(index, "fan.speed")
    }
}
