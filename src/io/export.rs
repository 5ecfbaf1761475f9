//! CSV export of the result matrix and JSON export of the connection list.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::sim::connection::Connection;
use crate::sim::types::RunParameters;
use crate::sim::values::ResultMatrix;

/// Timestamp layout of the first CSV column.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Exports committed results to a CSV file at the given path.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_results_csv(
    results: &ResultMatrix,
    params: &RunParameters,
    path: &Path,
) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_results_csv(results, params, buf)
}

/// Writes committed results as CSV to any writer.
///
/// The header is `timestamp` followed by the slot labels. Each row holds the
/// timestep's timestamp and one value per slot. Values use the shortest
/// representation that parses back to the same `f64`, so output is
/// deterministic for identical runs.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_results_csv(
    results: &ResultMatrix,
    params: &RunParameters,
    writer: impl Write,
) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(
        std::iter::once("timestamp").chain(results.labels().iter().map(String::as_str)),
    )?;

    for (t, row) in results.rows().enumerate() {
        let stamp = params.timestamp(t).format(TIMESTAMP_FORMAT).to_string();
        wtr.write_record(std::iter::once(stamp).chain(row.iter().map(f64::to_string)))?;
    }

    wtr.flush()?;
    Ok(())
}

/// Exports the resolved connections as a JSON array.
///
/// # Errors
///
/// Returns an `io::Error` if file creation, serialization or writing fails.
pub fn export_connections_json(connections: &[Connection], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_connections_json(connections, buf)
}

/// Writes the resolved connections as pretty-printed JSON to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if serialization or writing fails.
pub fn write_connections_json(connections: &[Connection], mut writer: impl Write) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut writer, connections)?;
    writeln!(writer)?;
    writer.flush()
}
