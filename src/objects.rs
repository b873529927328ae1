//! Per-class object count/size report, computed entirely from the meta
//! counters plus name lookups in the small store. Instances are costed
//! at their class's declared instance size, arrays at element count
//! times element width.

use std::io::{Read, Seek};

use serde::Serialize;

use crate::dump::accessor::ParsedAccessor;
use crate::errors::{HprofError, Result};
use crate::format;
use crate::parser::gc_record::JavaType;
use crate::parser::sizes::SizeInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    Count,
    Size,
}

impl SortBy {
    pub fn from_flag(flag: &str) -> Result<SortBy> {
        match flag {
            "count" | "" => Ok(SortBy::Count),
            "size" => Ok(SortBy::Size),
            other => Err(HprofError::format(format!(
                "sort key {other:?}, use \"count\" or \"size\""
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectItem {
    pub name: String,
    pub instances_count: u64,
    pub total_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectsReport {
    pub total_count: u64,
    pub total_size: u64,
    pub items: Vec<ObjectItem>,
}

pub fn collect_objects<D: Read + Seek, I: Read + Seek>(
    accessor: &ParsedAccessor<D, I>,
) -> Result<ObjectsReport> {
    let small = accessor.small();
    let meta = accessor.meta();
    let sizes = SizeInfo::new(accessor.id_size());

    let mut total_size: u64 = 0;
    let mut total_count: u64 = 0;
    let mut items = Vec::new();

    for (element_type, count) in meta.prim_arrays_count() {
        let elements = meta
            .prim_array_elements_count()
            .get(element_type)
            .copied()
            .unwrap_or(0);
        let size = sizes.of_type(*element_type) * elements;
        total_size += size;
        total_count += count;
        items.push(ObjectItem {
            name: format!("{element_type}[]"),
            instances_count: *count,
            total_size: size,
        });
    }

    for (array_class_id, count) in meta.obj_arrays_count() {
        let elements = meta
            .obj_array_elements_count()
            .get(array_class_id)
            .copied()
            .unwrap_or(0);
        let class_name_id = small
            .get_load_class_by_class_object_id(*array_class_id)?
            .class_name_id;
        let raw_name = &small.get_utf8(class_name_id)?.characters;
        // array class names are descriptors, e.g. [Ljava/lang/Object;
        let (name, _) = format::method_signature(raw_name);
        let size = sizes.of_type(JavaType::Object) * elements;
        total_size += size;
        total_count += count;
        items.push(ObjectItem {
            name,
            instances_count: *count,
            total_size: size,
        });
    }

    for (class_object_id, count) in meta.instances_count() {
        let class_name_id = small
            .get_load_class_by_class_object_id(*class_object_id)?
            .class_name_id;
        let name = small.get_utf8(class_name_id)?.characters.clone();
        let class_dump = small.get_class_dump(*class_object_id)?;
        let size = class_dump.instance_size.max(0) as u64 * count;
        total_size += size;
        total_count += count;
        items.push(ObjectItem {
            name,
            instances_count: *count,
            total_size: size,
        });
    }

    Ok(ObjectsReport {
        total_count,
        total_size,
        items,
    })
}

const COLUMN_GAP: usize = 10;

fn align_left(s: &str, width: usize) -> String {
    format!("{s}{}", " ".repeat(width + COLUMN_GAP - s.chars().count()))
}

fn align_right(s: &str, width: usize) -> String {
    format!("{}{s}", " ".repeat(width + COLUMN_GAP - s.chars().count()))
}

fn percentage(part: u64, whole: u64) -> u64 {
    if whole == 0 {
        return 0;
    }
    100 * part / whole
}

pub fn render_objects(report: &ObjectsReport, sort_by: SortBy) -> String {
    let mut items = report.items.clone();
    let (count_header, size_header) = match sort_by {
        SortBy::Count => {
            items.sort_by(|a, b| b.instances_count.cmp(&a.instances_count));
            ("Count ↓", "Size")
        }
        SortBy::Size => {
            items.sort_by(|a, b| b.total_size.cmp(&a.total_size));
            ("Count", "Size ↓")
        }
    };

    let mut rows = vec![(
        "Class Name".to_string(),
        count_header.to_string(),
        size_header.to_string(),
    )];
    for item in &items {
        rows.push((
            format::class_name(&item.name),
            format!(
                "{} ({}%)",
                item.instances_count,
                percentage(item.instances_count, report.total_count)
            ),
            format!(
                "{} ({}%)",
                format::pretty_bytes_size(item.total_size),
                percentage(item.total_size, report.total_size)
            ),
        ));
    }

    let name_width = rows.iter().map(|r| r.0.chars().count()).max().unwrap_or(0);
    let count_width = rows.iter().map(|r| r.1.chars().count()).max().unwrap_or(0);
    let size_width = rows.iter().map(|r| r.2.chars().count()).max().unwrap_or(0);

    let mut out = format!(
        "Instances: {}\nTotal Size: {}\n\n",
        report.total_count,
        format::pretty_bytes_size(report.total_size)
    );
    for (i, (name, count, size)) in rows.iter().enumerate() {
        out.push_str(&align_left(name, name_width));
        out.push_str(" |");
        out.push_str(&align_right(count, count_width));
        out.push_str(" |");
        out.push_str(&align_right(size, size_width));
        out.push_str(" |\n");
        if i == 0 {
            let width = name_width + count_width + size_width + 3 * COLUMN_GAP + 6;
            out.push_str(&"-".repeat(width));
            out.push('\n');
        }
    }
    out
}

pub fn render_objects_json(report: &ObjectsReport, sort_by: SortBy) -> Result<String> {
    let mut sorted = report.clone();
    match sort_by {
        SortBy::Count => sorted
            .items
            .sort_by(|a, b| b.instances_count.cmp(&a.instances_count)),
        SortBy::Size => sorted.items.sort_by(|a, b| b.total_size.cmp(&a.total_size)),
    }
    serde_json::to_string_pretty(&sorted)
        .map_err(|e| HprofError::format(format!("cannot encode report as JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{heap_fixture, parse_in_memory};

    fn report() -> ObjectsReport {
        let accessor = parse_in_memory(heap_fixture()).into_accessor();
        collect_objects(&accessor).unwrap()
    }

    #[test]
    fn aggregates_instances_and_arrays() {
        let report = report();
        // 3 instances + 1 object array + 2 primitive arrays
        assert_eq!(report.total_count, 6);

        let byte_arrays = report
            .items
            .iter()
            .find(|i| i.name == "byte[]")
            .expect("byte[] row");
        assert_eq!(byte_arrays.instances_count, 1);
        assert_eq!(byte_arrays.total_size, 3); // "hi!"

        let char_arrays = report
            .items
            .iter()
            .find(|i| i.name == "char[]")
            .expect("char[] row");
        assert_eq!(char_arrays.total_size, 4); // "OK" in UTF-16

        let object_arrays = report
            .items
            .iter()
            .find(|i| i.name == "java.lang.Object[]")
            .expect("object array row");
        assert_eq!(object_arrays.instances_count, 1);
        assert_eq!(object_arrays.total_size, 16); // 2 references

        let app = report
            .items
            .iter()
            .find(|i| i.name == "App")
            .expect("App row");
        assert_eq!(app.instances_count, 1);
        assert_eq!(app.total_size, 12); // declared instance size

        let strings = report
            .items
            .iter()
            .find(|i| i.name == "java/lang/String")
            .expect("string row");
        assert_eq!(strings.instances_count, 2);
    }

    #[test]
    fn sort_flag_parsing() {
        assert_eq!(SortBy::from_flag("count").unwrap(), SortBy::Count);
        assert_eq!(SortBy::from_flag("size").unwrap(), SortBy::Size);
        assert_eq!(SortBy::from_flag("").unwrap(), SortBy::Count);
        assert!(SortBy::from_flag("weight").is_err());
    }

    #[test]
    fn table_rendering_sorts_and_formats() {
        let text = render_objects(&report(), SortBy::Size);
        assert!(text.starts_with("Instances: 6\n"));
        assert!(text.contains("Class Name"));
        assert!(text.contains("Size ↓"));
        assert!(text.contains("java.lang.String")); // dots in the table
        let header_pos = text.find("Class Name").unwrap();
        let app_pos = text.find("App").unwrap();
        assert!(header_pos < app_pos);
    }

    #[test]
    fn json_rendering_round_trips() {
        let text = render_objects_json(&report(), SortBy::Count).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["total_count"], 6);
        assert!(value["items"].as_array().unwrap().len() >= 5);
    }
}
