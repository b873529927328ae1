//! Text formatting helpers shared by the report consumers: JVM class
//! names, human-readable byte sizes, and the Java method-descriptor
//! grammar (`(Ljava/lang/String;)V` and friends).

use nom::branch::alt;
use nom::bytes::complete::take_until;
use nom::character::complete::char;
use nom::combinator::{map, opt, value};
use nom::multi::{many0, many0_count};
use nom::sequence::{delimited, pair};
use nom::IResult;

/// Turns `java/lang/String` into `java.lang.String`.
pub fn class_name(raw: &str) -> String {
    raw.replace('/', ".")
}

const KILOBYTE: f64 = 1024.0;
const MEGABYTE: f64 = KILOBYTE * KILOBYTE;
const GIGABYTE: f64 = KILOBYTE * MEGABYTE;

pub fn pretty_bytes_size(len: u64) -> String {
    let len = len as f64;
    let (value, unit) = if len >= GIGABYTE {
        (len / GIGABYTE, "GiB")
    } else if len >= MEGABYTE {
        (len / MEGABYTE, "MiB")
    } else if len >= KILOBYTE {
        (len / KILOBYTE, "KiB")
    } else {
        return format!("{len:.0}B");
    };
    format!("{value:.2}{unit}")
}

fn primitive_type(i: &str) -> IResult<&str, &str> {
    alt((
        value("byte", char('B')),
        value("char", char('C')),
        value("double", char('D')),
        value("float", char('F')),
        value("int", char('I')),
        value("long", char('J')),
        value("short", char('S')),
        value("boolean", char('Z')),
        value("void", char('V')),
    ))(i)
}

fn object_type(i: &str) -> IResult<&str, String> {
    map(delimited(char('L'), take_until(";"), char(';')), class_name)(i)
}

fn type_descriptor(i: &str) -> IResult<&str, String> {
    map(
        pair(
            many0_count(char('[')),
            alt((map(primitive_type, String::from), object_type)),
        ),
        |(dimensions, base)| base + &"[]".repeat(dimensions),
    )(i)
}

fn signature(i: &str) -> IResult<&str, (Vec<String>, String)> {
    let (i, parenthesized) = opt(delimited(char('('), many0(type_descriptor), char(')')))(i)?;
    match parenthesized {
        Some(arguments) => {
            let (i, return_type) = opt(type_descriptor)(i)?;
            Ok((i, (arguments, return_type.unwrap_or_default())))
        }
        // a bare descriptor list, e.g. a field or local-variable type
        None => {
            let (i, arguments) = many0(type_descriptor)(i)?;
            Ok((i, (arguments, String::new())))
        }
    }
}

/// Formats a JVM method descriptor as `(argument list, return type)`,
/// both in Java source notation. Unparseable input comes back verbatim
/// as the argument side.
pub fn method_signature(descriptor: &str) -> (String, String) {
    match signature(descriptor) {
        Ok((_, (arguments, return_type))) => (arguments.join(", "), return_type),
        Err(_) => (descriptor.to_string(), String::new()),
    }
}
