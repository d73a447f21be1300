const SEPARATORS: [char; 3] = [' ', '-', '\''];

pub const DEFAULT_TEACHER_NAME: &str = "Your Teacher";

/// Normalizes the capitalization of a person's name for display.
///
/// Spaces, hyphens and apostrophes are kept verbatim and delimit segments.
/// Each segment is title-cased, with `Mc` and `Mac` prefixes getting a
/// capitalized letter after the prefix ("mcdonald" -> "McDonald").
pub fn capitalize_proper_name(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut output = String::with_capacity(trimmed.len());
    let mut segment = String::new();

    for ch in trimmed.chars() {
        if SEPARATORS.contains(&ch) {
            output.push_str(&capitalize_segment(&segment));
            segment.clear();
            output.push(ch);
        } else {
            segment.push(ch);
        }
    }
    output.push_str(&capitalize_segment(&segment));

    output
}

fn capitalize_segment(segment: &str) -> String {
    if has_prefix(segment, "mc") {
        return format!("Mc{}", upper_first(&segment[2..]));
    }
    if has_prefix(segment, "mac") && segment.chars().count() > 3 {
        return format!("Mac{}", upper_first(&segment[3..]));
    }
    upper_first(segment)
}

fn has_prefix(segment: &str, prefix: &str) -> bool {
    segment
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

fn upper_first(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.as_str().to_lowercase().chars())
            .collect(),
        None => String::new(),
    }
}

/// Display name guessed from an address like `john.doe@school.org` ("John Doe").
/// Addresses without a dot in the local part yield [`DEFAULT_TEACHER_NAME`].
pub fn teacher_name_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default().trim();
    if !local.contains('.') {
        return DEFAULT_TEACHER_NAME.to_string();
    }

    local
        .split('.')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
