//! Report Rendering Module
//!
//! Formats the per-sample classification results as a tab-delimited table:
//! one header row, then one row per sample. Columns are the sample name
//! followed by every reportable resistance class in the fixed order given by
//! the class table. A cell holds `-` when the class had no hit, otherwise
//! the `;`-joined allele strings in the order the hits were seen.

use crate::classify::ClassHitMap;

/// Cell content for a class with no hits.
const EMPTY_CELL: &str = "-";

/// Header row: `strain` plus the reportable class columns.
pub fn header_row(classes: &[String]) -> String {
    let mut columns = Vec::with_capacity(classes.len() + 1);
    columns.push("strain");
    columns.extend(classes.iter().map(String::as_str));
    columns.join("\t")
}

/// One sample's row against the fixed class list.
pub fn render_row(sample: &str, classes: &[String], hits: &ClassHitMap) -> String {
    let mut columns = Vec::with_capacity(classes.len() + 1);
    columns.push(sample.to_string());

    for class in classes {
        match hits.get(class) {
            Some(alleles) => columns.push(alleles.join(";")),
            None => columns.push(EMPTY_CELL.to_string()),
        }
    }

    columns.join("\t")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classes(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_header_row() {
        assert_eq!(
            header_row(&classes(&["Ami", "Flq", "Tet"])),
            "strain\tAmi\tFlq\tTet"
        );
    }

    #[test]
    fn test_render_row_empty_cells() {
        let map = ClassHitMap::new();
        assert_eq!(
            render_row("sampleA", &classes(&["Ami", "Tet"]), &map),
            "sampleA\t-\t-"
        );
    }

    #[test]
    fn test_render_row_joined_in_hit_order() {
        let mut map = ClassHitMap::new();
        map.add("Ami", "Aph3*".to_string());
        map.add("Ami", "StrA".to_string());
        map.add("Flq", "GyrA-83F".to_string());

        assert_eq!(
            render_row("sampleA", &classes(&["Ami", "Flq", "Tet"]), &map),
            "sampleA\tAph3*;StrA\tGyrA-83F\t-"
        );
    }

    #[test]
    fn test_repeated_allele_stays_visible() {
        let mut map = ClassHitMap::new();
        map.add("Ami", "Aph3".to_string());
        map.add("Ami", "Aph3".to_string());

        assert_eq!(
            render_row("s", &classes(&["Ami"]), &map),
            "s\tAph3;Aph3"
        );
    }
}
