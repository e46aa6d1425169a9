// External crates
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref GROUP_NAME_RE: Regex =
        Regex::new(r"^[a-zA-Z0-9_./-]+$").unwrap();
    static ref CONTAINER_NAME_RE: Regex =
        Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.-]+$").unwrap();
}

/// Log group names may use `a-z A-Z 0-9 _ - / . #` and must be longer than
/// one character once the `#` marker is stripped.
pub fn is_valid_group_name(name: &str) -> bool {
    let stripped = name.replace('#', "");
    stripped.len() > 1 && GROUP_NAME_RE.is_match(&stripped)
}

/// Container names start with an alphanumeric and continue with
/// `a-z A-Z 0-9 _ . -`, at least two characters total.
pub fn is_valid_container_name(name: &str) -> bool {
    name.len() > 1 && CONTAINER_NAME_RE.is_match(name)
}
