//! JVM binary class-name normalization.
//!
//! The dump records names as the runtime sees them (`java/lang/String`,
//! `[Ljava/lang/Object;`, `[[I`); reports use display names
//! (`java.lang.String`, `java.lang.Object[]`, `int[][]`).

pub fn normalize_class_name(raw: &str) -> String {
    let dims = raw.bytes().take_while(|b| *b == b'[').count();
    if dims == 0 {
        return raw.replace('/', ".");
    }
    let element = &raw[dims..];
    let base: String = match element.as_bytes().first() {
        Some(b'L') => element[1..].trim_end_matches(';').replace('/', "."),
        Some(b'Z') => "boolean".to_string(),
        Some(b'B') => "byte".to_string(),
        Some(b'C') => "char".to_string(),
        Some(b'S') => "short".to_string(),
        Some(b'I') => "int".to_string(),
        Some(b'J') => "long".to_string(),
        Some(b'F') => "float".to_string(),
        Some(b'D') => "double".to_string(),
        // not a descriptor; keep what we can read
        _ => element.replace('/', "."),
    };
    let mut name = base;
    for _ in 0..dims {
        name.push_str("[]");
    }
    name
}
