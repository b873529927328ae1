//! Environment and heap summary. The environment half comes from the
//! system properties the JVM stores in `java.lang.System.props`: the
//! `Properties` object wraps a `ConcurrentHashMap`, whose node table is
//! an object array of key/value string pairs, all reachable through the
//! accessor. The heap half is computed from the meta counters and the
//! stored class dumps.

use std::io::{Read, Seek};

use ahash::{AHashMap, AHashSet};
use indoc::formatdoc;

use crate::dump::accessor::ParsedAccessor;
use crate::errors::{HprofError, Result};
use crate::format::pretty_bytes_size;
use crate::heap::{ClassChain, Heap};
use crate::parser::gc_record::JavaType;
use crate::parser::sizes::SizeInfo;

const JAVA_LANG_SYSTEM: &str = "java/lang/System";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvProperties {
    pub system: String,
    pub architecture: String,
    pub java_home: String,
    pub java_version: String,
    pub java_name: String,
    pub java_vendor: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapProperties {
    pub classes: usize,
    pub gc_roots: usize,
    pub instances: u64,
    pub heap_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub captured_at_ms: u64,
    pub env: EnvProperties,
    pub heap: HeapProperties,
    /// Sorted key/value pairs; filled only when all properties were
    /// requested.
    pub properties: Vec<(String, String)>,
}

fn class_chain_by_name<D: Read + Seek, I: Read + Seek>(
    heap: &mut Heap<'_, D, I>,
    name: &str,
) -> Result<ClassChain> {
    let accessor = heap.accessor();
    let mut class_object_id = None;
    for load_class in accessor.small().list_load_classes() {
        if let Ok(class_name) = accessor.get_utf8(load_class.class_name_id) {
            if class_name.characters == name {
                class_object_id = Some(load_class.class_object_id);
                break;
            }
        }
    }
    let id = class_object_id.ok_or_else(|| HprofError::not_found(format!("class {name}")))?;
    heap.parse_class(id)
}

fn walk_system_properties<D: Read + Seek, I: Read + Seek>(
    heap: &mut Heap<'_, D, I>,
    system: &ClassChain,
) -> Result<AHashMap<String, String>> {
    let props_id = system.static_field("props")?.as_object()?;
    let props = heap.parse_normal_object(props_id)?;
    let map_id = props.field_value("map")?.value.as_object()?;
    let map = heap.parse_normal_object(map_id)?;
    let table_id = map.field_value("table")?.value.as_object()?;
    let table = heap.parse_object_array(table_id)?;

    let mut properties = AHashMap::new();
    for node_id in table.elements {
        if node_id == 0 {
            continue;
        }
        let node = heap.parse_normal_object(node_id)?;
        let key = heap.parse_java_string(&node.field_value("key")?.value)?;
        let value = heap.parse_java_string(&node.field_value("val")?.value)?;
        properties.insert(key, value);
    }
    Ok(properties)
}

/// All system properties captured in the dump. A dump with no
/// `java/lang/System` class at all yields an empty map; any failure
/// while walking the properties structures themselves propagates.
pub fn system_properties<D: Read + Seek, I: Read + Seek>(
    accessor: &mut ParsedAccessor<D, I>,
) -> Result<AHashMap<String, String>> {
    let mut heap = Heap::new(accessor);
    let system = match class_chain_by_name(&mut heap, JAVA_LANG_SYSTEM) {
        Ok(chain) => chain,
        Err(HprofError::NotFound(_)) => return Ok(AHashMap::new()),
        Err(e) => return Err(e),
    };
    walk_system_properties(&mut heap, &system)
}

fn env_properties(properties: &AHashMap<String, String>) -> EnvProperties {
    let get = |key: &str| properties.get(key).cloned().unwrap_or_default();
    EnvProperties {
        system: get("os.name"),
        architecture: get("os.arch"),
        java_home: get("java.home"),
        java_version: get("java.version"),
        java_name: format!(
            "{} ({}, {})",
            get("java.vm.name"),
            get("java.vm.version"),
            get("java.vm.info")
        ),
        java_vendor: get("java.vm.vendor"),
    }
}

fn heap_properties<D: Read + Seek, I: Read + Seek>(
    accessor: &ParsedAccessor<D, I>,
) -> Result<HeapProperties> {
    let small = accessor.small();
    let meta = accessor.meta();
    let sizes = SizeInfo::new(accessor.id_size());

    let mut class_set = AHashSet::new();
    for load_class in small.list_load_classes() {
        class_set.insert(load_class.class_object_id);
    }

    let gc_roots = small.list_gc_root_jni_globals().len()
        + small.list_gc_root_jni_locals().len()
        + small.list_gc_root_java_frames().len()
        + small.list_gc_root_sticky_classes().len()
        + small.list_gc_root_thread_objects().len();

    let mut heap_size: u64 = 0;
    for (ty, elements) in meta.prim_array_elements_count() {
        heap_size += sizes.of_type(*ty) * elements;
    }
    for elements in meta.obj_array_elements_count().values() {
        heap_size += sizes.of_type(JavaType::Object) * elements;
    }
    for (class_object_id, count) in meta.instances_count() {
        let class_dump = small.get_class_dump(*class_object_id)?;
        heap_size += class_dump.instance_size.max(0) as u64 * count;
    }

    let instances: u64 = meta.instances_count().values().sum::<u64>()
        + meta.obj_arrays_count().values().sum::<u64>()
        + meta.prim_arrays_count().values().sum::<u64>();

    Ok(HeapProperties {
        classes: class_set.len(),
        gc_roots,
        instances,
        heap_size,
    })
}

pub fn collect_summary<D: Read + Seek, I: Read + Seek>(
    accessor: &mut ParsedAccessor<D, I>,
    all_props: bool,
) -> Result<Summary> {
    let properties = system_properties(accessor)?;
    let env = env_properties(&properties);
    let heap = heap_properties(accessor)?;
    let properties = if all_props {
        let mut sorted: Vec<(String, String)> = properties.into_iter().collect();
        sorted.sort();
        sorted
    } else {
        Vec::new()
    };
    Ok(Summary {
        captured_at_ms: accessor.timestamp_ms(),
        env,
        heap,
        properties,
    })
}

fn format_capture_time(timestamp_ms: u64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms as i64)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn render_summary(summary: &Summary) -> String {
    let mut out = formatdoc!(
        "Heap dump captured at: {captured}

         Environment:
           OS: {system} ({architecture})
           Java home: {java_home}
           Java version: {java_version}
           Java VM: {java_name}
           Vendor: {java_vendor}

         Heap:
           Classes: {classes}
           GC roots: {gc_roots}
           Instances: {instances}
           Heap size: {heap_size}
        ",
        captured = format_capture_time(summary.captured_at_ms),
        system = summary.env.system,
        architecture = summary.env.architecture,
        java_home = summary.env.java_home,
        java_version = summary.env.java_version,
        java_name = summary.env.java_name,
        java_vendor = summary.env.java_vendor,
        classes = summary.heap.classes,
        gc_roots = summary.heap.gc_roots,
        instances = summary.heap.instances,
        heap_size = pretty_bytes_size(summary.heap.heap_size),
    );
    if !summary.properties.is_empty() {
        out.push_str("\nSystem properties:\n");
        for (key, value) in &summary.properties {
            out.push_str(&format!("  {key}={value}\n"));
        }
    }
    out
}
