//! printf-style substitution of an event's integer arguments.
//!
//! Events only carry `u32` arguments, so the integer conversions
//! (`d i u x X o c`) plus `%%` are supported with the usual flags, width,
//! precision and length modifiers. Anything else is copied to the output
//! verbatim and counted as a mismatch: the line stays readable and
//! rendering never fails. Widths and precisions are clamped to
//! [`MAX_MESSAGE_LEN`], so a single conversion can never blow up a line.

/// Largest width or precision honoured by a single conversion.
pub const MAX_MESSAGE_LEN: usize = 1000;

#[derive(Debug, Default, Clone, Copy)]
struct Directive {
    left: bool,
    plus: bool,
    space: bool,
    alternate: bool,
    zero: bool,
    width: usize,
    precision: Option<usize>,
    length: Length,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum Length {
    Char,
    Short,
    #[default]
    Int,
    Wide,
}

/// Appends `format` to `out` with conversions filled from `args`.
///
/// Returns the number of conversions that could not be satisfied: they are
/// unsupported, they ran past the end of `args`, or their width or precision
/// had to be clamped.
pub fn format_into(out: &mut String, format: &str, args: &[u32]) -> usize {
    let bytes = format.as_bytes();
    let mut mismatches = 0;
    let mut next_arg = 0;
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'%' {
            i += 1;
            continue;
        }
        out.push_str(&format[literal_start..i]);
        let conversion_start = i;
        i += 1;

        let mut directive = Directive::default();
        while i < bytes.len() {
            match bytes[i] {
                b'-' => directive.left = true,
                b'+' => directive.plus = true,
                b' ' => directive.space = true,
                b'#' => directive.alternate = true,
                b'0' => directive.zero = true,
                _ => break,
            }
            i += 1;
        }

        if i < bytes.len() && bytes[i] == b'*' {
            i += 1;
            match take_arg(args, &mut next_arg) {
                Some(value) => {
                    let width = value as i32;
                    if width < 0 {
                        directive.left = true;
                    }
                    directive.width =
                        clamp_to_message(width.unsigned_abs() as usize, &mut mismatches);
                }
                None => mismatches += 1,
            }
        } else {
            directive.width = clamp_to_message(parse_digits(bytes, &mut i), &mut mismatches);
        }

        if i < bytes.len() && bytes[i] == b'.' {
            i += 1;
            if i < bytes.len() && bytes[i] == b'*' {
                i += 1;
                match take_arg(args, &mut next_arg) {
                    Some(value) => {
                        let precision = value as i32;
                        directive.precision = (precision >= 0)
                            .then(|| clamp_to_message(precision as usize, &mut mismatches));
                    }
                    None => mismatches += 1,
                }
            } else {
                let precision = parse_digits(bytes, &mut i);
                directive.precision = Some(clamp_to_message(precision, &mut mismatches));
            }
        }

        directive.length = parse_length(bytes, &mut i);

        let Some(&conversion) = bytes.get(i) else {
            // Dangling '%' at the end of the format
            out.push_str(&format[conversion_start..]);
            mismatches += 1;
            literal_start = bytes.len();
            break;
        };
        i += 1;

        match conversion {
            b'%' => out.push('%'),
            b'd' | b'i' | b'u' | b'x' | b'X' | b'o' | b'c' => {
                match take_arg(args, &mut next_arg) {
                    Some(value) => write_integer(out, &directive, conversion, value),
                    None => {
                        out.push_str(&format[conversion_start..i]);
                        mismatches += 1;
                    }
                }
            }
            _ => {
                // Unsupported conversion (or a multi-byte character after
                // '%'); copy through the next char boundary.
                while !format.is_char_boundary(i) {
                    i += 1;
                }
                out.push_str(&format[conversion_start..i]);
                mismatches += 1;
            }
        }
        literal_start = i;
    }

    if literal_start < bytes.len() {
        out.push_str(&format[literal_start..]);
    }
    mismatches
}

/// Convenience wrapper returning a new string.
pub fn format_event(format: &str, args: &[u32]) -> String {
    let mut out = String::with_capacity(format.len() + 16);
    format_into(&mut out, format, args);
    out
}

fn take_arg(args: &[u32], next: &mut usize) -> Option<u32> {
    let value = args.get(*next).copied();
    if value.is_some() {
        *next += 1;
    }
    value
}

fn parse_digits(bytes: &[u8], i: &mut usize) -> usize {
    let mut value = 0usize;
    while *i < bytes.len() && bytes[*i].is_ascii_digit() {
        value = value
            .saturating_mul(10)
            .saturating_add((bytes[*i] - b'0') as usize);
        *i += 1;
    }
    value
}

fn clamp_to_message(value: usize, mismatches: &mut usize) -> usize {
    if value > MAX_MESSAGE_LEN {
        *mismatches += 1;
        MAX_MESSAGE_LEN
    } else {
        value
    }
}

fn parse_length(bytes: &[u8], i: &mut usize) -> Length {
    let mut length = Length::Int;
    while *i < bytes.len() {
        length = match (bytes[*i], length) {
            (b'h', Length::Short) => Length::Char,
            (b'h', _) => Length::Short,
            (b'l' | b'L' | b'q' | b'j' | b'z' | b't', _) => Length::Wide,
            _ => break,
        };
        *i += 1;
    }
    length
}

fn write_integer(out: &mut String, directive: &Directive, conversion: u8, value: u32) {
    let mut body = String::new();
    let mut sign = "";
    let mut prefix = "";

    match conversion {
        b'd' | b'i' => {
            let signed: i64 = match directive.length {
                Length::Char => value as u8 as i8 as i64,
                Length::Short => value as u16 as i16 as i64,
                Length::Int => value as i32 as i64,
                Length::Wide => value as i64,
            };
            if signed < 0 {
                sign = "-";
            } else if directive.plus {
                sign = "+";
            } else if directive.space {
                sign = " ";
            }
            digits(&mut body, directive, signed.unsigned_abs(), 10, false);
        }
        b'c' => {
            body.push(value as u8 as char);
            pad(out, directive, "", "", &body, false);
            return;
        }
        _ => {
            let unsigned = match directive.length {
                Length::Char => value as u8 as u64,
                Length::Short => value as u16 as u64,
                _ => value as u64,
            };
            match conversion {
                b'u' => digits(&mut body, directive, unsigned, 10, false),
                b'o' => {
                    digits(&mut body, directive, unsigned, 8, false);
                    if directive.alternate && !body.starts_with('0') {
                        body.insert(0, '0');
                    }
                }
                upper_or_lower => {
                    let upper = upper_or_lower == b'X';
                    digits(&mut body, directive, unsigned, 16, upper);
                    if directive.alternate && unsigned != 0 {
                        prefix = if upper { "0X" } else { "0x" };
                    }
                }
            }
        }
    }

    pad(out, directive, sign, prefix, &body, directive.precision.is_none());
}

fn digits(body: &mut String, directive: &Directive, value: u64, radix: u32, upper: bool) {
    // A zero precision with a zero value produces no digits at all
    if directive.precision == Some(0) && value == 0 {
        return;
    }
    let rendered = match (radix, upper) {
        (8, _) => format!("{:o}", value),
        (16, false) => format!("{:x}", value),
        (16, true) => format!("{:X}", value),
        _ => value.to_string(),
    };
    let min_digits = directive.precision.unwrap_or(1);
    push_repeated(body, '0', min_digits.saturating_sub(rendered.len()));
    body.push_str(&rendered);
}

fn pad(out: &mut String, directive: &Directive, sign: &str, prefix: &str, body: &str, zero_ok: bool) {
    let len = sign.len() + prefix.len() + body.len();
    let fill = directive.width.saturating_sub(len);

    out.reserve(len + fill);
    if directive.left {
        out.push_str(sign);
        out.push_str(prefix);
        out.push_str(body);
        push_repeated(out, ' ', fill);
    } else if directive.zero && zero_ok {
        out.push_str(sign);
        out.push_str(prefix);
        push_repeated(out, '0', fill);
        out.push_str(body);
    } else {
        push_repeated(out, ' ', fill);
        out.push_str(sign);
        out.push_str(prefix);
        out.push_str(body);
    }
}

fn push_repeated(out: &mut String, ch: char, count: usize) {
    out.extend(std::iter::repeat(ch).take(count));
}
