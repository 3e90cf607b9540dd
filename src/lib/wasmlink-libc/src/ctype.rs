//! `<ctype.h>` in the C locale. Arguments are truncated to a byte.

use wasmlink::{abi::Args, Host, StubLibrary};
use wasmtime::Caller;

use crate::StubResult;

fn byte(args: Args<'_>) -> u8 {
    args.i32(0) as u8
}

fn is_blank(c: &u8) -> bool {
    matches!(c, b' ' | b'\t')
}

fn is_space(c: &u8) -> bool {
    matches!(c, b' ' | b'\t'..=b'\r')
}

fn is_print(c: &u8) -> bool {
    c.is_ascii_graphic() || *c == b' '
}

macro_rules! classifiers {
    ($($name:ident => $pred:expr),* $(,)?) => {
        $(
            fn $name(_: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
                let pred: fn(&u8) -> bool = $pred;
                Ok(pred(&byte(args)).into())
            }
        )*
    };
}

classifiers! {
    isalnum => u8::is_ascii_alphanumeric,
    isalpha => u8::is_ascii_alphabetic,
    isblank => is_blank,
    iscntrl => u8::is_ascii_control,
    isdigit => u8::is_ascii_digit,
    isgraph => u8::is_ascii_graphic,
    islower => u8::is_ascii_lowercase,
    isprint => is_print,
    ispunct => u8::is_ascii_punctuation,
    isspace => is_space,
    isupper => u8::is_ascii_uppercase,
    isxdigit => u8::is_ascii_hexdigit,
}

fn tolower(_: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    let c = byte(args);
    Ok(if c.is_ascii_uppercase() {
        c.to_ascii_lowercase() as i32
    } else {
        args.i32(0)
    }
    .into())
}

fn toupper(_: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    let c = byte(args);
    Ok(if c.is_ascii_lowercase() {
        c.to_ascii_uppercase() as i32
    } else {
        args.i32(0)
    }
    .into())
}

pub fn library() -> StubLibrary {
    StubLibrary::new("ctype")
        .func("isalnum", isalnum)
        .func("isalpha", isalpha)
        .func("isblank", isblank)
        .func("iscntrl", iscntrl)
        .func("isdigit", isdigit)
        .func("isgraph", isgraph)
        .func("islower", islower)
        .func("isprint", isprint)
        .func("ispunct", ispunct)
        .func("isspace", isspace)
        .func("isupper", isupper)
        .func("isxdigit", isxdigit)
        .func("tolower", tolower)
        .func("toupper", toupper)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn c_locale_classes() {
        assert!(is_space(&0x0b));
        assert!(!is_space(&b'a'));
        assert!(is_print(&b' '));
        assert!(!is_print(&0x7f));
        assert!(!is_print(&0x80));
        assert!(is_blank(&b'\t'));
        assert!(!is_blank(&b'\n'));
    }
}
