//! NISTCOM image attribute record.
//!
//! An ordered list of `name value` pairs carried in a comment segment whose
//! text starts with `NIST_COM`. The first entry's value is the entry count.

use log::warn;

pub const NCM_HEADER: &str = "NIST_COM";
pub const NCM_PIX_WIDTH: &str = "PIX_WIDTH";
pub const NCM_PIX_HEIGHT: &str = "PIX_HEIGHT";
pub const NCM_PIX_DEPTH: &str = "PIX_DEPTH";
pub const NCM_PPI: &str = "PPI";
pub const NCM_LOSSY: &str = "LOSSY";
pub const NCM_COLORSPACE: &str = "COLORSPACE";
pub const NCM_COMPRESSION: &str = "COMPRESSION";
pub const NCM_WSQ_RATE: &str = "WSQ_BITRATE";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NistCom {
    entries: Vec<(String, Option<String>)>,
}

impl NistCom {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_deref()))
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Returns the value stored under `name`, if the entry exists and has one.
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.position(name)
            .and_then(|index| self.entries[index].1.as_deref())
    }

    /// Inserts or replaces an entry. New entries go to the end.
    pub fn set(&mut self, name: &str, value: Option<&str>) {
        let value = value.map(str::to_owned);
        match self.position(name) {
            Some(index) => self.entries[index].1 = value,
            None => self.entries.push((name.to_owned(), value)),
        }
    }

    /// Removes an entry, returning whether it was present.
    pub fn remove(&mut self, name: &str) -> bool {
        match self.position(name) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Resolution in pixels per inch, when recorded and positive.
    pub fn ppi(&self) -> Option<u32> {
        let value = self.lookup(NCM_PPI)?.trim();
        let ppi = value
            .parse::<i64>()
            .ok()
            .or_else(|| value.parse::<f64>().ok().map(|v| v as i64))?;
        u32::try_from(ppi).ok().filter(|&ppi| ppi > 0)
    }

    /// Records the attributes of a WSQ-compressed grayscale image.
    ///
    /// An existing non-zero `LOSSY` entry is never cleared.
    pub fn combine_wsq(
        &mut self,
        width: u32,
        height: u32,
        depth: u32,
        ppi: Option<u32>,
        lossy: bool,
        bitrate: f32,
    ) {
        if !self.contains_key(NCM_HEADER) {
            self.entries.insert(0, (NCM_HEADER.to_owned(), None));
        }
        self.set(NCM_PIX_WIDTH, Some(&width.to_string()));
        self.set(NCM_PIX_HEIGHT, Some(&height.to_string()));
        self.set(NCM_PIX_DEPTH, Some(&depth.to_string()));
        let ppi = ppi.map_or(-1, i64::from);
        self.set(NCM_PPI, Some(&ppi.to_string()));

        let already_lossy = self.lookup(NCM_LOSSY).is_some_and(|v| v != "0");
        if already_lossy && !lossy {
            warn!("request to unset lossy flag ignored");
        } else {
            self.set(NCM_LOSSY, Some(if lossy { "1" } else { "0" }));
        }

        self.set(NCM_COLORSPACE, Some("GRAY"));
        self.set(NCM_COMPRESSION, Some("WSQ"));
        self.set(NCM_WSQ_RATE, Some(&format!("{bitrate:.6}")));
        self.update_header_count();
    }

    /// Drops the WSQ compression attributes, e.g. after decompression.
    pub fn remove_wsq_attributes(&mut self) {
        self.remove(NCM_COMPRESSION);
        self.remove(NCM_WSQ_RATE);
        if self.contains_key(NCM_HEADER) {
            self.update_header_count();
        }
    }

    /// Formats the record as `name value` lines without a trailing newline.
    /// A name without a value stands alone on its line.
    pub fn serialize(&self) -> String {
        self.entries
            .iter()
            .map(|(name, value)| match value {
                Some(value) => format!("{} {}", name, value),
                None => name.clone(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Parses `name value` lines, LF or CRLF terminated. A name ends at the
    /// first blank; the value runs to the end of the line. Later duplicates
    /// replace earlier ones.
    pub fn parse(text: &str) -> Self {
        let mut record = Self::new();
        for line in text.trim_end_matches('\0').split('\n') {
            let line = line.trim_end_matches('\r').trim_start_matches([' ', '\t']);
            if line.is_empty() {
                continue;
            }
            let (name, value) = match line.find([' ', '\t']) {
                Some(split) => (
                    &line[..split],
                    Some(line[split..].trim_start_matches([' ', '\t'])),
                ),
                None => (line, None),
            };
            record.set(name, value);
        }
        record
    }

    /// Whether a comment payload carries a NISTCOM record.
    pub fn is_nistcom(payload: &[u8]) -> bool {
        payload.starts_with(NCM_HEADER.as_bytes())
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(n, _)| n == name)
    }

    fn update_header_count(&mut self) {
        let count = self.entries.len().to_string();
        self.set(NCM_HEADER, Some(&count));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_lookup_remove() {
        let mut record = NistCom::new();
        record.set("A", Some("1"));
        record.set("B", None);
        assert_eq!(record.lookup("A"), Some("1"));
        assert_eq!(record.lookup("B"), None);
        assert!(record.contains_key("B"));

        record.set("A", Some("2"));
        assert_eq!(record.len(), 2);
        assert_eq!(record.lookup("A"), Some("2"));

        assert!(record.remove("A"));
        assert!(!record.remove("A"));
        assert_eq!(record.len(), 1);
    }

    #[test]
    fn test_combine_wsq_attributes() {
        let mut record = NistCom::new();
        record.combine_wsq(500, 600, 8, Some(500), true, 0.75);

        let names: Vec<&str> = record.iter().map(|(name, _)| name).collect();
        assert_eq!(
            names,
            vec![
                NCM_HEADER,
                NCM_PIX_WIDTH,
                NCM_PIX_HEIGHT,
                NCM_PIX_DEPTH,
                NCM_PPI,
                NCM_LOSSY,
                NCM_COLORSPACE,
                NCM_COMPRESSION,
                NCM_WSQ_RATE
            ]
        );
        assert_eq!(record.lookup(NCM_HEADER), Some("9"));
        assert_eq!(record.lookup(NCM_WSQ_RATE), Some("0.750000"));
        assert_eq!(record.ppi(), Some(500));
    }

    #[test]
    fn test_combine_keeps_lossy_flag() {
        let mut record = NistCom::new();
        record.set(NCM_HEADER, Some("2"));
        record.set(NCM_LOSSY, Some("1"));
        record.combine_wsq(256, 256, 8, None, false, 2.25);
        assert_eq!(record.lookup(NCM_LOSSY), Some("1"));
        assert_eq!(record.lookup(NCM_PPI), Some("-1"));
        assert_eq!(record.ppi(), None);
    }

    #[test]
    fn test_serialize_parse() {
        let mut record = NistCom::new();
        record.combine_wsq(300, 400, 8, Some(1000), true, 1.5);
        record.set("CUSTOM", Some("two words"));
        let text = record.serialize();
        assert!(text.starts_with("NIST_COM 9\nPIX_WIDTH 300\n"));
        assert!(!text.ends_with('\n'));

        let parsed = NistCom::parse(&text);
        assert_eq!(parsed, record);
        assert_eq!(parsed.lookup("CUSTOM"), Some("two words"));
    }

    #[test]
    fn test_parse_tolerates_blanks() {
        let parsed = NistCom::parse("NIST_COM\t3\n\nPPI   500.0\nLOSSY 1\n\0");
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed.lookup(NCM_HEADER), Some("3"));
        assert_eq!(parsed.ppi(), Some(500));
    }

    #[test]
    fn test_parse_crlf_lines() {
        let parsed = NistCom::parse("NIST_COM 3\r\nPPI 500\r\nSOURCE live scan\r\n");
        assert_eq!(parsed.lookup(NCM_HEADER), Some("3"));
        assert_eq!(parsed.lookup("SOURCE"), Some("live scan"));
        assert_eq!(parsed.ppi(), Some(500));
    }

    #[test]
    fn test_serialize_name_without_value() {
        let mut record = NistCom::new();
        record.set("FLAG", None);
        record.set("PPI", Some("500"));
        assert_eq!(record.serialize(), "FLAG\nPPI 500");

        let parsed = NistCom::parse(&record.serialize());
        assert_eq!(parsed.lookup("FLAG"), None);
        assert!(parsed.contains_key("FLAG"));
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_remove_wsq_attributes() {
        let mut record = NistCom::new();
        record.combine_wsq(256, 256, 8, Some(500), true, 0.75);
        record.remove_wsq_attributes();
        assert!(!record.contains_key(NCM_COMPRESSION));
        assert!(!record.contains_key(NCM_WSQ_RATE));
        assert_eq!(record.lookup(NCM_HEADER), Some("7"));
    }
}
