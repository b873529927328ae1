//! Per-thread stack dump reconstruction. The recipe: list the
//! thread-object GC roots, read each thread instance from the heap for
//! its name and state fields, look up its stack trace and frames, and
//! attach local variables by matching JNI-local and Java-frame roots to
//! (thread serial, stack position).

use std::io::{Read, Seek};

use ahash::AHashMap;

use crate::dump::accessor::ParsedAccessor;
use crate::errors::{HprofError, Result};
use crate::format;
use crate::heap::Heap;

pub const UNKNOWN_STRING: &str = "<unknown string>";

const THREAD_STATE_ALIVE: i32 = 0x0001;
const THREAD_STATE_TERMINATED: i32 = 0x0002;
const THREAD_STATE_RUNNABLE: i32 = 0x0004;
const THREAD_STATE_BLOCKED_ON_MONITOR_ENTER: i32 = 0x0400;
const THREAD_STATE_WAITING_INDEFINITELY: i32 = 0x0010;
const THREAD_STATE_WAITING_WITH_TIMEOUT: i32 = 0x0020;

/// JVM thread status bit set, as stored in java.lang.Thread#threadStatus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadStatus(pub i32);

impl std::fmt::Display for ThreadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.0 & THREAD_STATE_RUNNABLE != 0 {
            "RUNNABLE"
        } else if self.0 & THREAD_STATE_BLOCKED_ON_MONITOR_ENTER != 0 {
            "BLOCKED"
        } else if self.0 & THREAD_STATE_WAITING_INDEFINITELY != 0 {
            "WAITING"
        } else if self.0 & THREAD_STATE_WAITING_WITH_TIMEOUT != 0 {
            "TIMED_WAITING"
        } else if self.0 & THREAD_STATE_TERMINATED != 0 {
            "TERMINATED"
        } else if self.0 & THREAD_STATE_ALIVE != 0 {
            "NEW"
        } else {
            "RUNNABLE"
        };
        f.write_str(status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalKind {
    JniLocal,
    JavaFrame,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVar {
    pub object_id: u64,
    pub type_signature: String,
    pub kind: LocalKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadFrame {
    pub method_name: String,
    pub method_signature: String,
    pub file_name: String,
    pub class_name: String,
    pub line_number: String,
    pub locals: Vec<LocalVar>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadStackTrace {
    pub thread_name: String,
    pub thread_id: i64,
    pub daemon: bool,
    pub priority: i32,
    pub status: ThreadStatus,
    pub number_of_frames: u32,
    pub frames: Vec<ThreadFrame>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadDump {
    pub stack_traces: Vec<ThreadStackTrace>,
}

/// Best-effort class name for a local-variable object: it can be a plain
/// instance, an object array, a primitive array, or a Class<?> object.
/// `NotFound` moves probing to the next kind; other errors abort.
fn read_object_name<D: Read + Seek, I: Read + Seek>(
    accessor: &mut ParsedAccessor<D, I>,
    object_id: u64,
) -> Result<String> {
    let class_object_id = match accessor.get_instance_header(object_id) {
        Ok(header) => header.class_object_id,
        Err(HprofError::NotFound(_)) => match accessor.get_obj_array_header(object_id) {
            Ok(header) => header.array_class_id,
            Err(HprofError::NotFound(_)) => match accessor.get_prim_array_header(object_id) {
                Ok(header) => {
                    return Ok(format!("[{}", header.element_type.descriptor_letter()));
                }
                Err(HprofError::NotFound(_)) => {
                    let class_name_id = accessor
                        .get_load_class_by_class_object_id(object_id)?
                        .class_name_id;
                    return Ok(format!(
                        "class {}",
                        accessor.get_utf8(class_name_id)?.characters
                    ));
                }
                Err(e) => return Err(e),
            },
            Err(e) => return Err(e),
        },
        Err(e) => return Err(e),
    };
    let class_name_id = accessor
        .get_load_class_by_class_object_id(class_object_id)?
        .class_name_id;
    Ok(accessor.get_utf8(class_name_id)?.characters.clone())
}

fn utf8_or_unknown<D: Read + Seek, I: Read + Seek>(
    accessor: &ParsedAccessor<D, I>,
    id: u64,
) -> String {
    accessor
        .get_utf8(id)
        .map(|s| s.characters.clone())
        .unwrap_or_else(|_| UNKNOWN_STRING.to_string())
}

pub fn collect_thread_dump<D: Read + Seek, I: Read + Seek>(
    accessor: &mut ParsedAccessor<D, I>,
) -> Result<ThreadDump> {
    // locals keyed by (thread serial, position in stack)
    let mut locals: AHashMap<(u32, u32), Vec<LocalVar>> = AHashMap::new();

    let jni_locals = accessor.list_gc_root_jni_locals().to_vec();
    for root in jni_locals {
        let type_signature = read_object_name(accessor, root.object_id)?;
        locals
            .entry((root.thread_serial_number, root.frame_number_in_stack_trace))
            .or_default()
            .push(LocalVar {
                object_id: root.object_id,
                type_signature,
                kind: LocalKind::JniLocal,
            });
    }

    let java_frames = accessor.list_gc_root_java_frames().to_vec();
    for root in java_frames {
        let type_signature = read_object_name(accessor, root.object_id)?;
        locals
            .entry((root.thread_serial_number, root.frame_number_in_stack_trace))
            .or_default()
            .push(LocalVar {
                object_id: root.object_id,
                type_signature,
                kind: LocalKind::JavaFrame,
            });
    }

    let thread_objects = accessor.list_gc_root_thread_objects().to_vec();
    let mut stack_traces = Vec::with_capacity(thread_objects.len());
    for thread_object in thread_objects {
        let mut heap = Heap::new(accessor);
        let instance = heap.parse_normal_object(thread_object.thread_object_id)?;
        let name_field = instance.field_value("name")?;
        let thread_name = heap.parse_java_string(&name_field.value)?;
        let daemon = instance.field_value("daemon")?.value.as_bool()?;
        let priority = instance.field_value("priority")?.value.as_int()?;
        let thread_id = instance.field_value("tid")?.value.as_long()?;
        let status = ThreadStatus(instance.field_value("threadStatus")?.value.as_int()?);

        let trace = accessor
            .get_trace(thread_object.thread_sequence_number)?
            .clone();
        let mut frames = Vec::with_capacity(trace.stack_frame_ids.len());
        for (position, frame_id) in trace.stack_frame_ids.iter().enumerate() {
            let frame = *accessor.get_frame(*frame_id)?;
            let class_name_id = accessor
                .get_load_class_by_serial(frame.class_serial_number)?
                .class_name_id;
            let frame_locals = locals
                .get(&(thread_object.thread_sequence_number, position as u32))
                .cloned()
                .unwrap_or_default();
            frames.push(ThreadFrame {
                method_name: utf8_or_unknown(accessor, frame.method_name_id),
                method_signature: utf8_or_unknown(accessor, frame.method_signature_id),
                file_name: utf8_or_unknown(accessor, frame.source_file_name_id),
                class_name: utf8_or_unknown(accessor, class_name_id),
                line_number: frame.line_number.to_string(),
                locals: frame_locals,
            });
        }

        stack_traces.push(ThreadStackTrace {
            thread_name,
            thread_id,
            daemon,
            priority,
            status,
            number_of_frames: trace.number_of_frames,
            frames,
        });
    }

    Ok(ThreadDump { stack_traces })
}

fn render_thread_line(trace: &ThreadStackTrace) -> String {
    let mut line = format!(
        "\"{}\", ID={}, prio={}, status={}",
        trace.thread_name, trace.thread_id, trace.priority, trace.status
    );
    if trace.daemon {
        line.push_str(" (daemon)");
    }
    line
}

fn render_location(file_name: &str, line_number: &str) -> String {
    if file_name == UNKNOWN_STRING {
        return String::new();
    }
    if line_number == "Unknown" {
        return file_name.to_string();
    }
    format!("{file_name}:{line_number}")
}

fn render_frame(frame: &ThreadFrame) -> String {
    let (arguments, return_type) = format::method_signature(&frame.method_signature);
    let location = render_location(&frame.file_name, &frame.line_number);
    let mut line = format!(
        "{return_type} {}.{}({arguments})",
        format::class_name(&frame.class_name),
        frame.method_name
    );
    if !location.is_empty() {
        line.push(' ');
        line.push_str(&location);
    }
    line
}

fn render_local(local: &LocalVar) -> String {
    let signature = &local.type_signature;
    if signature.starts_with("class ") {
        return signature.clone();
    }
    let descriptor = if signature.starts_with('[') {
        signature.clone()
    } else {
        format!("L{signature};")
    };
    let (formatted, _) = format::method_signature(&descriptor);
    formatted
}

pub fn render_thread_dump(dump: &ThreadDump, local_vars: bool) -> String {
    let mut traces: Vec<&ThreadStackTrace> = dump.stack_traces.iter().collect();
    traces.sort_by_key(|t| t.thread_id);
    let mut out = String::new();
    for trace in traces {
        out.push_str(&render_thread_line(trace));
        out.push('\n');
        for frame in &trace.frames {
            out.push_str(&format!("    {}\n", render_frame(frame)));
            if local_vars {
                for local in &frame.locals {
                    out.push_str(&format!("        local {}\n", render_local(local)));
                }
            }
        }
        out.push('\n');
    }
    out
}
