//! Dataset input and delimited-text output.
//!
//! - **Spreadsheets** (`.xls`, `.xlsx`, `.xlsm`, `.xlsb`, `.ods`) are read with
//!   `calamine`: first worksheet, first row as header, blank rows skipped.
//! - **Delimited text** is read with `csv`, decoded through `encoding_rs`
//!   (UTF-8 unless told otherwise). `.tsv` implies a tab delimiter.
//! - The `-` path reads stdin / writes stdout.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use calamine::{Data, Range, Reader, open_workbook_auto};
use csv::{QuoteStyle, Trim};
use encoding_rs::{Encoding, UTF_8};
use log::debug;

use crate::data::{CellValue, Dataset, excel_serial_to_date};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

const SPREADSHEET_EXTENSIONS: &[&str] = &["xls", "xlsx", "xlsm", "xlsb", "ods"];

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn is_spreadsheet(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SPREADSHEET_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

pub fn open_csv_reader_from_path(
    path: &Path,
    delimiter: u8,
    has_headers: bool,
) -> Result<csv::Reader<Box<dyn Read>>> {
    open_csv_reader_with_trim(path, delimiter, has_headers, Trim::None)
}

/// Like [`open_csv_reader_from_path`] but strips whitespace per `trim`.
pub fn open_csv_reader_with_trim(
    path: &Path,
    delimiter: u8,
    has_headers: bool,
    trim: Trim,
) -> Result<csv::Reader<Box<dyn Read>>> {
    let reader: Box<dyn Read> = if is_dash(path) {
        Box::new(std::io::stdin().lock())
    } else {
        Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Opening input file {path:?}"))?,
        ))
    };
    Ok(csv::ReaderBuilder::new()
        .has_headers(has_headers)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true)
        .trim(trim)
        .from_reader(reader))
}

pub fn open_csv_writer(path: Option<&Path>, delimiter: u8) -> Result<csv::Writer<Box<dyn Write>>> {
    let writer: Box<dyn Write> = match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        )),
        _ => Box::new(std::io::stdout()),
    };
    Ok(csv::WriterBuilder::new()
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .from_writer(writer))
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

/// Loads `path` as a dataset, choosing the reader from its extension.
pub fn read_dataset(
    path: &Path,
    delimiter: Option<u8>,
    encoding: &'static Encoding,
) -> Result<Dataset> {
    let dataset = if is_spreadsheet(path) {
        read_spreadsheet(path)?
    } else {
        read_delimited(path, resolve_input_delimiter(path, delimiter), encoding)?
    };
    debug!(
        "Loaded {} row(s) x {} column(s) from {:?}",
        dataset.row_count(),
        dataset.columns.len(),
        path
    );
    Ok(dataset)
}

pub fn read_delimited(path: &Path, delimiter: u8, encoding: &'static Encoding) -> Result<Dataset> {
    let mut reader = open_csv_reader_from_path(path, delimiter, true)?;
    let headers = reader
        .byte_headers()
        .with_context(|| format!("Reading header row of {path:?}"))?
        .clone();
    let mut dataset = Dataset::new(decode_record(&headers, encoding)?);
    for (idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {} in {:?}", idx + 2, path))?;
        let values = decode_record(&record, encoding)
            .with_context(|| format!("Decoding row {} in {:?}", idx + 2, path))?;
        dataset.push_row(values.iter().map(|v| CellValue::from(v.as_str())).collect());
    }
    Ok(dataset)
}

pub fn read_spreadsheet(path: &Path) -> Result<Dataset> {
    let mut workbook =
        open_workbook_auto(path).with_context(|| format!("Opening workbook {path:?}"))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow!("Workbook {path:?} has no worksheets"))?
        .with_context(|| format!("Reading first worksheet of {path:?}"))?;
    Ok(dataset_from_range(&range))
}

/// First row is the header; rows with no present cell are dropped. An empty
/// sheet yields an empty dataset.
pub fn dataset_from_range(range: &Range<Data>) -> Dataset {
    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Dataset::default();
    };
    let mut dataset = Dataset::new(header_row.iter().map(|cell| cell.to_string()).collect());
    for row in rows {
        let cells = row.iter().map(spreadsheet_cell).collect::<Vec<_>>();
        if cells.iter().all(CellValue::is_missing) {
            continue;
        }
        dataset.push_row(cells);
    }
    dataset
}

pub fn spreadsheet_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty | Data::Error(_) => CellValue::Empty,
        Data::String(s) => CellValue::from(s.as_str()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::String(b.to_string()),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64())
            .map(CellValue::Date)
            .unwrap_or(CellValue::Number(dt.as_f64())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::from(s.as_str()),
    }
}

/// Writes `dataset` with a header row to `path` (stdout for `-` / `None`).
pub fn write_dataset(dataset: &Dataset, path: Option<&Path>, delimiter: u8) -> Result<()> {
    let mut writer = open_csv_writer(path, delimiter)?;
    writer
        .write_record(&dataset.columns)
        .context("Writing output headers")?;
    for (idx, row) in dataset.rows.iter().enumerate() {
        writer
            .write_record(row.iter().map(CellValue::as_display))
            .with_context(|| format!("Writing output row {}", idx + 2))?;
    }
    writer.flush().context("Flushing output writer")?;
    Ok(())
}
