// SAM output for paired results.
//
// Minimal SAM serialization: header from the contig table, one record per
// surviving paired record per mate, plus single-end secondary records.
// Scores are edit distances, so records carry a full-length match CIGAR
// with the distance in the NM tag.

use std::io::{self, Write};

use crate::aligner::{AlignmentStatus, PairedResult, SingleResult};
use crate::genome::{contig_at, ContigSpan, Direction};
use crate::io::PairedWriter;
use crate::reads::{Read, ReadPair};

pub mod sam_flags {
    pub const PAIRED: u16 = 0x1;
    pub const PROPER_PAIR: u16 = 0x2;
    pub const UNMAPPED: u16 = 0x4;
    pub const MATE_UNMAPPED: u16 = 0x8;
    pub const REVERSE: u16 = 0x10;
    pub const MATE_REVERSE: u16 = 0x20;
    pub const FIRST_IN_PAIR: u16 = 0x40;
    pub const SECOND_IN_PAIR: u16 = 0x80;
    pub const SECONDARY: u16 = 0x100;
}

/// Writes SAM records for each emitted pair.
pub struct SamPairWriter<W: Write> {
    writer: W,
    contigs: Vec<ContigSpan>,
}

impl<W: Write> SamPairWriter<W> {
    pub fn new(writer: W, contigs: Vec<ContigSpan>) -> Self {
        SamPairWriter { writer, contigs }
    }

    /// Emit @HD, @SQ, and @PG header lines.
    pub fn write_header(&mut self, command_line: &str) -> io::Result<()> {
        writeln!(self.writer, "@HD\tVN:1.6\tSO:unknown")?;
        for contig in &self.contigs {
            writeln!(self.writer, "@SQ\tSN:{}\tLN:{}", contig.name, contig.length)?;
        }
        writeln!(
            self.writer,
            "@PG\tID:tether-align\tPN:tether-align\tVN:{}\tCL:{}",
            env!("CARGO_PKG_VERSION"),
            command_line
        )
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    fn qname(read: &Read) -> &str {
        let id = read.id.as_str();
        match id.rfind('/') {
            Some(pos) if matches!(&id[pos..], "/1" | "/2") => &id[..pos],
            _ => id,
        }
    }

    fn write_record(
        &mut self,
        read: &Read,
        mate: &Read,
        flags: u16,
        status: AlignmentStatus,
        location: u64,
        direction: Direction,
        mapq: u8,
        score: i32,
        mate_status: AlignmentStatus,
        mate_location: u64,
    ) -> io::Result<()> {
        let mapped = status != AlignmentStatus::NotFound;
        let (rname, pos) = rname_pos(&self.contigs, status, location);
        let cigar = if mapped {
            format!("{}M", read.len())
        } else {
            "*".to_string()
        };

        let (rnext, pnext) = if mate_status == AlignmentStatus::NotFound {
            ("*", 0)
        } else {
            let (mate_rname, mate_pos) = rname_pos(&self.contigs, mate_status, mate_location);
            if mate_rname == rname && mapped {
                ("=", mate_pos)
            } else {
                (mate_rname, mate_pos)
            }
        };
        let tlen = if mapped
            && mate_status != AlignmentStatus::NotFound
            && rnext == "="
        {
            let t = mate_location as i64 - location as i64;
            if t >= 0 {
                t + mate.len() as i64
            } else {
                t - mate.len() as i64
            }
        } else {
            0
        };

        // SEQ/QUAL in alignment orientation.
        let (seq, qual): (Vec<u8>, Vec<u8>) = if direction.is_reverse() && mapped {
            (
                read.reverse_complement(),
                read.qual.iter().rev().copied().collect(),
            )
        } else {
            (read.seq.clone(), read.qual.clone())
        };

        write!(
            self.writer,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            Self::qname(read),
            flags,
            rname,
            pos,
            mapq,
            cigar,
            rnext,
            pnext,
            tlen,
            String::from_utf8_lossy(&seq),
            String::from_utf8_lossy(&qual),
        )?;
        if mapped {
            write!(self.writer, "\tNM:i:{}", score)?;
        }
        writeln!(self.writer)
    }
}

fn rname_pos(contigs: &[ContigSpan], status: AlignmentStatus, location: u64) -> (&str, u64) {
    if status == AlignmentStatus::NotFound {
        return ("*", 0);
    }
    match contig_at(contigs, location) {
        Some((idx, offset)) => (contigs[idx].name.as_str(), offset + 1),
        None => ("*", 0),
    }
}

fn base_flags(result: &PairedResult, which: usize, secondary: bool) -> u16 {
    use sam_flags::*;
    let other = 1 - which;
    let mut flags = PAIRED;
    flags |= if which == 0 { FIRST_IN_PAIR } else { SECOND_IN_PAIR };
    if result.aligned_as_pair
        && result.status[0] != AlignmentStatus::NotFound
        && result.status[1] != AlignmentStatus::NotFound
    {
        flags |= PROPER_PAIR;
    }
    if result.status[which] == AlignmentStatus::NotFound {
        flags |= UNMAPPED;
    }
    if result.status[other] == AlignmentStatus::NotFound {
        flags |= MATE_UNMAPPED;
    }
    if result.direction[which].is_reverse() {
        flags |= REVERSE;
    }
    if result.direction[other].is_reverse() {
        flags |= MATE_REVERSE;
    }
    if secondary {
        flags |= SECONDARY;
    }
    flags
}

impl<W: Write + Send> PairedWriter for SamPairWriter<W> {
    fn write_pairs(
        &mut self,
        pair: &ReadPair,
        results: &[PairedResult],
        single_results: [&[SingleResult]; 2],
        first_is_primary: bool,
    ) -> io::Result<()> {
        for (i, result) in results.iter().enumerate() {
            let secondary = i != 0 || !first_is_primary;
            for which in 0..2 {
                let other = 1 - which;
                self.write_record(
                    &pair.reads[which],
                    &pair.reads[other],
                    base_flags(result, which, secondary),
                    result.status[which],
                    result.location[which],
                    result.direction[which],
                    result.mapq[which],
                    result.score[which],
                    result.status[other],
                    result.location[other],
                )?;
            }
        }

        for which in 0..2 {
            let other = 1 - which;
            let mate_status = results
                .first()
                .map(|r| r.status[other])
                .unwrap_or(AlignmentStatus::NotFound);
            let mate_location = results.first().map(|r| r.location[other]).unwrap_or(0);
            for single in single_results[which] {
                let mut flags = sam_flags::PAIRED | sam_flags::SECONDARY;
                flags |= if which == 0 {
                    sam_flags::FIRST_IN_PAIR
                } else {
                    sam_flags::SECOND_IN_PAIR
                };
                if single.direction.is_reverse() {
                    flags |= sam_flags::REVERSE;
                }
                if mate_status == AlignmentStatus::NotFound {
                    flags |= sam_flags::MATE_UNMAPPED;
                }
                self.write_record(
                    &pair.reads[which],
                    &pair.reads[other],
                    flags,
                    single.status,
                    single.location,
                    single.direction,
                    single.mapq,
                    single.score,
                    mate_status,
                    mate_location,
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::INVALID_GENOME_LOCATION;

    fn contigs() -> Vec<ContigSpan> {
        vec![ContigSpan {
            name: "chr1".to_string(),
            offset: 0,
            length: 10_000,
        }]
    }

    fn test_pair() -> ReadPair {
        ReadPair::new(
            Read::new("p/1", b"ACGT", b"IIII", None),
            Read::new("p/2", b"ACGT", b"IIII", None),
        )
    }

    fn written(pair: &ReadPair, result: PairedResult) -> String {
        let mut writer = SamPairWriter::new(Vec::new(), contigs());
        writer
            .write_pairs(pair, std::slice::from_ref(&result), [&[], &[]], true)
            .unwrap();
        String::from_utf8(writer.into_inner()).unwrap()
    }

    #[test]
    fn test_unmapped_pair_records() {
        let out = written(&test_pair(), PairedResult::unmapped());
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in &lines {
            assert!(line.contains("\t*\t0\t"));
            assert!(!line.contains("NM:i"));
        }
        let flags0: u16 = lines[0].split('\t').nth(1).unwrap().parse().unwrap();
        assert_ne!(flags0 & sam_flags::UNMAPPED, 0);
        assert_ne!(flags0 & sam_flags::MATE_UNMAPPED, 0);
    }

    #[test]
    fn test_mapped_pair_coordinates_one_based() {
        let mut result = PairedResult::unmapped();
        result.status = [AlignmentStatus::SingleHit; 2];
        result.location = [100, 400];
        result.direction = [Direction::Forward, Direction::ReverseComplement];
        result.score = [0, 1];
        result.mapq = [70, 70];
        result.aligned_as_pair = true;

        let out = written(&test_pair(), result);
        let lines: Vec<&str> = out.lines().collect();
        let fields0: Vec<&str> = lines[0].split('\t').collect();
        assert_eq!(fields0[2], "chr1");
        assert_eq!(fields0[3], "101"); // 0-based 100 → 1-based 101
        assert_eq!(fields0[6], "=");
        assert!(lines[0].contains("NM:i:0"));
        let flags0: u16 = fields0[1].parse().unwrap();
        assert_ne!(flags0 & sam_flags::PROPER_PAIR, 0);
        assert_eq!(flags0 & sam_flags::UNMAPPED, 0);
    }

    #[test]
    fn test_invalid_location_writes_star() {
        let mut result = PairedResult::unmapped();
        result.location = [INVALID_GENOME_LOCATION; 2];
        let out = written(&test_pair(), result);
        assert!(out.lines().all(|l| l.contains("\t*\t0\t")));
    }
}
