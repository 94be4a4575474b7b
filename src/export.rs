// CSV export of flattened sale lines

use std::io;
use std::path::Path;

use crate::error::Result;
use crate::model::{flatten_sales, Sale};

/// Write one CSV row per sale line, with a header. Returns rows written.
pub fn write_lines<W: io::Write>(sales: &[Sale], writer: W) -> Result<usize> {
    let mut wtr = csv::Writer::from_writer(writer);
    let lines = flatten_sales(sales);

    for line in &lines {
        wtr.serialize(line)?;
    }
    wtr.flush().map_err(csv::Error::from)?;

    Ok(lines.len())
}

pub fn export_to_path(sales: &[Sale], path: &Path) -> Result<usize> {
    let file = std::fs::File::create(path).map_err(csv::Error::from)?;
    let written = write_lines(sales, io::BufWriter::new(file))?;
    log::info!("exported {} lines to {}", written, path.display());
    Ok(written)
}
