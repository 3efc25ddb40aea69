// Paired FASTQ supplier built on bio::io::fastq.
//
// Opens R1/R2 files with automatic gzip detection (extension plus magic
// bytes) and streams read pairs. The molecule barcode is taken from a
// BX:Z: tag in the read description when present; untagged reads all
// share the anonymous barcode group.

use std::fs::File;
use std::io::{self, Read as IoRead, Seek, SeekFrom};
use std::path::Path;

use bio::io::fastq;
use flate2::read::MultiGzDecoder;

use crate::io::PairedReadSupplier;
use crate::reads::Read;

const BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Check for the gzip magic bytes without consuming the stream.
fn is_gzip(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 2];
    let n = file.read(&mut magic)?;
    file.seek(SeekFrom::Start(0))?;
    Ok(n == 2 && magic[0] == 0x1f && magic[1] == 0x8b)
}

fn open_reader(path: &Path) -> io::Result<fastq::Reader<io::BufReader<Box<dyn IoRead + Send>>>> {
    let inner: Box<dyn IoRead + Send> = if is_gzip(path)? {
        log::debug!("{}: gzip input detected", path.display());
        Box::new(MultiGzDecoder::new(File::open(path)?))
    } else {
        Box::new(File::open(path)?)
    };
    Ok(fastq::Reader::from_bufread(io::BufReader::with_capacity(
        BUFFER_SIZE,
        inner,
    )))
}

/// Extract a BX:Z: barcode tag from a FASTQ description field.
fn barcode_from_description(desc: Option<&str>) -> Option<String> {
    let desc = desc?;
    for token in desc.split_whitespace() {
        if let Some(tag) = token.strip_prefix("BX:Z:") {
            if !tag.is_empty() {
                return Some(tag.to_string());
            }
        }
    }
    None
}

/// Streams pairs from two parallel FASTQ files.
pub struct PairedFastqSupplier {
    records1: fastq::Records<io::BufReader<Box<dyn IoRead + Send>>>,
    records2: fastq::Records<io::BufReader<Box<dyn IoRead + Send>>>,
    path1: String,
    path2: String,
}

impl PairedFastqSupplier {
    pub fn open(r1: &Path, r2: &Path) -> io::Result<Self> {
        Ok(PairedFastqSupplier {
            records1: open_reader(r1)?.records(),
            records2: open_reader(r2)?.records(),
            path1: r1.display().to_string(),
            path2: r2.display().to_string(),
        })
    }

    fn convert(record: fastq::Record) -> Read {
        let barcode = barcode_from_description(record.desc());
        Read::new(record.id(), record.seq(), record.qual(), barcode)
    }
}

impl PairedReadSupplier for PairedFastqSupplier {
    fn next_pair(&mut self) -> io::Result<Option<(Read, Read)>> {
        let rec1 = self
            .records1
            .next()
            .transpose()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let rec2 = self
            .records2
            .next()
            .transpose()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        match (rec1, rec2) {
            (Some(r1), Some(r2)) => Ok(Some((Self::convert(r1), Self::convert(r2)))),
            (None, None) => Ok(None),
            (Some(_), None) | (None, Some(_)) => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "paired FASTQ files have different read counts: {} vs {}",
                    self.path1, self.path2
                ),
            )),
        }
    }
}
