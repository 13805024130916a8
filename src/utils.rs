//! # Utility Functions Module
//!
//! Small helpers shared by the tool wrappers and the queue: the `args!` macro
//! for ffmpeg/ffprobe command lines, unique file-name tokens and identifier
//! derivation for generated components.

use chrono::Utc;

/// Build a `Vec<String>` of tool arguments from heterogeneous expressions.
///
/// ```rust
/// use video_blueprint::args;
///
/// let threshold = 0.4;
/// let args = args!["-filter:v", format!("select='gt(scene,{})',showinfo", threshold)];
/// assert_eq!(args[1], "select='gt(scene,0.4)',showinfo");
/// ```
#[macro_export]
macro_rules! args {
    [$($item:expr),* $(,)?] => {
        vec![$($item.to_string()),*]
    };
}

/// Monotonically distinct token for generated file names (unix millis)
pub fn unique_token() -> i64 {
    Utc::now().timestamp_millis()
}

/// Derive a PascalCase component identifier from a file stem.
///
/// Non-alphanumeric characters split words; an identifier that would start
/// with a digit gets a `Video` prefix.
pub fn component_name(stem: &str) -> String {
    let mut name: String = stem
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect();

    if name.is_empty() {
        return "Video".to_string();
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert_str(0, "Video");
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_macro() {
        let frames = 1;
        let result = args!["-frames:v", frames, "-y"];
        assert_eq!(result, vec!["-frames:v".to_string(), "1".to_string(), "-y".to_string()]);
    }

    #[test]
    fn test_component_name() {
        assert_eq!(component_name("travel-77"), "Travel77");
        assert_eq!(component_name("cat tech_promo"), "CatTechPromo");
        assert_eq!(component_name("7days"), "Video7days");
        assert_eq!(component_name("---"), "Video");
    }

    #[test]
    fn test_unique_token_is_positive() {
        assert!(unique_token() > 0);
    }
}
