//! VCF text output
//!
//! [`VcfFormatter`] renders variants as VCF 4.2 data lines. The genotype matrix carries
//! no QUAL, FILTER or ID columns, so these are always `.`; the only INFO content is the
//! optional `AC`/`AN`/`AF` summary computed from the codes.

use std::io::Write;

use crate::{error::Result, variant::Variant};

/// VCF version written in the meta block
pub const VCF_VERSION: &str = "VCFv4.2";

/// Renders variants as tab-delimited VCF lines
#[derive(Clone, Copy, Default)]
pub struct VcfFormatter {
    /// Emit `AC`, `AN` and `AF` in the INFO column
    stats: bool,

    /// Reusable integer formatting buffer
    ibuf: itoa::Buffer,
}
impl VcfFormatter {
    #[must_use]
    pub fn new(stats: bool) -> Self {
        Self {
            stats,
            ibuf: itoa::Buffer::new(),
        }
    }

    #[must_use]
    pub fn with_stats(&self) -> bool {
        self.stats
    }

    /// Writes the meta lines and the `#CHROM` column header
    pub fn write_header<W: Write, S: AsRef<str>>(
        &self,
        writer: &mut W,
        reference: &str,
        chromosomes: &[String],
        subjects: &[S],
    ) -> Result<()> {
        writeln!(writer, "##fileformat={VCF_VERSION}")?;
        if !reference.is_empty() {
            writeln!(writer, "##reference={reference}")?;
        }
        for chromosome in chromosomes {
            writeln!(writer, "##contig=<ID={chromosome}>")?;
        }
        if self.stats {
            writeln!(
                writer,
                "##INFO=<ID=AC,Number=A,Type=Integer,Description=\"Allele count in genotypes\">"
            )?;
            writeln!(
                writer,
                "##INFO=<ID=AN,Number=1,Type=Integer,Description=\"Total number of alleles in called genotypes\">"
            )?;
            writeln!(
                writer,
                "##INFO=<ID=AF,Number=A,Type=Float,Description=\"Allele frequency\">"
            )?;
        }
        writeln!(
            writer,
            "##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">"
        )?;
        write!(writer, "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT")?;
        for subject in subjects {
            write!(writer, "\t{}", subject.as_ref())?;
        }
        writeln!(writer)?;
        Ok(())
    }

    /// Appends one newline-terminated data line to `out`
    pub fn format(&mut self, variant: &Variant, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(variant.chromosome.as_bytes());
        out.push(b'\t');
        out.extend_from_slice(self.ibuf.format(variant.position).as_bytes());
        out.extend_from_slice(b"\t.\t");
        out.extend_from_slice(&variant.reference);
        out.push(b'\t');
        if variant.alternative.is_empty() {
            out.push(b'.');
        } else {
            out.extend_from_slice(&variant.alternative);
        }
        out.extend_from_slice(b"\t.\t.\t");
        if self.stats {
            self.format_stats(variant, out)?;
        } else {
            out.push(b'.');
        }
        out.extend_from_slice(b"\tGT");

        let coder = variant.coder();
        for code in &variant.genotypes {
            out.push(b'\t');
            coder.decode(2, *code, out)?;
        }
        out.push(b'\n');
        Ok(())
    }

    fn format_stats(&mut self, variant: &Variant, out: &mut Vec<u8>) -> Result<()> {
        let stats = variant.allele_stats()?;
        if !stats.ac.is_empty() {
            out.extend_from_slice(b"AC=");
            for (idx, ac) in stats.ac.iter().enumerate() {
                if idx > 0 {
                    out.push(b',');
                }
                out.extend_from_slice(self.ibuf.format(*ac).as_bytes());
            }
            out.push(b';');
        }
        out.extend_from_slice(b"AN=");
        out.extend_from_slice(self.ibuf.format(stats.an).as_bytes());
        if !stats.ac.is_empty() {
            out.extend_from_slice(b";AF=");
            for idx in 0..stats.ac.len() {
                if idx > 0 {
                    out.push(b',');
                }
                match stats.af(idx) {
                    Some(af) => write!(out, "{af}")?,
                    None => out.push(b'.'),
                }
            }
        }
        Ok(())
    }

    /// Writes one data line
    pub fn write_variant<W: Write>(
        &mut self,
        writer: &mut W,
        variant: &Variant,
        buffer: &mut Vec<u8>,
    ) -> Result<()> {
        buffer.clear();
        self.format(variant, buffer)?;
        writer.write_all(buffer)?;
        Ok(())
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::GenotypeCoder;

    fn variant(phased: bool, alt: &str, gts: &[&str]) -> Variant {
        let coder = GenotypeCoder::new(phased);
        Variant::new(
            "chr2",
            1234,
            "A",
            alt,
            gts.iter().map(|g| coder.parse(g.as_bytes()).unwrap()).collect(),
            phased,
        )
    }

    #[test]
    fn test_header() {
        let formatter = VcfFormatter::new(true);
        let mut out = Vec::new();
        formatter
            .write_header(
                &mut out,
                "file:///ref.fa",
                &["chr1".to_string(), "chr2".to_string()],
                &["s1", "s2"],
            )
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "##fileformat=VCFv4.2");
        assert_eq!(lines[1], "##reference=file:///ref.fa");
        assert_eq!(lines[2], "##contig=<ID=chr1>");
        assert!(lines.iter().any(|l| l.starts_with("##INFO=<ID=AF")));
        assert_eq!(
            *lines.last().unwrap(),
            "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\ts1\ts2"
        );

        let mut out = Vec::new();
        VcfFormatter::new(false)
            .write_header(&mut out, "", &[], &Vec::<String>::new())
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(!text.contains("##INFO"));
        assert!(!text.contains("##reference"));
    }

    #[test]
    fn test_data_line() {
        let mut formatter = VcfFormatter::new(false);
        let mut out = Vec::new();
        formatter
            .format(&variant(true, "C", &["0|1", ".|.", "1|0"]), &mut out)
            .unwrap();
        assert_eq!(
            out,
            b"chr2\t1234\t.\tA\tC\t.\t.\t.\tGT\t0|1\t.|.\t1|0\n"
        );
    }

    #[test]
    fn test_stats() {
        let mut formatter = VcfFormatter::new(true);
        let mut out = Vec::new();
        formatter
            .format(&variant(false, "C,G", &["0/1", "1/2", "./.", "2/2"]), &mut out)
            .unwrap();
        let line = String::from_utf8(out).unwrap();
        let info = line.split('\t').nth(7).unwrap();
        assert_eq!(info, format!("AC=2,3;AN=6;AF={},{}", 2.0 / 6.0, 3.0 / 6.0));

        let mut out = Vec::new();
        formatter
            .format(&variant(false, "C", &["./."]), &mut out)
            .unwrap();
        let line = String::from_utf8(out).unwrap();
        assert_eq!(line.split('\t').nth(7).unwrap(), "AC=0;AN=0;AF=.");

        let mut out = Vec::new();
        let mut buffer = Vec::new();
        formatter
            .write_variant(&mut out, &variant(false, ".", &["0/0"]), &mut buffer)
            .unwrap();
        let line = String::from_utf8(out).unwrap();
        assert_eq!(line.split('\t').nth(7).unwrap(), "AN=2");
    }
}
