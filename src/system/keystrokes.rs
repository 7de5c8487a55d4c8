//! Keystroke encoding for `adb shell input keyboard text`.
//!
//! The text travels through the device's `sh` before `input` sees it, and
//! `input` itself turns `%s` into a space. Encoding rule:
//! - space becomes `%s`
//! - every character in [`SPECIAL_CHARS`] is prefixed with a backslash
//! - everything else is passed through
//!
//! `input` has no escape for a literal `%s` and cannot type control or
//! non-ASCII characters, so such lines are rejected instead of being typed
//! differently. For every line that encodes, [`decode_keystrokes`] returns
//! exactly what the device receives.

use crate::error::BridgeError;

/// Characters the remote shell would interpret. `%` is not among them: the
/// shell leaves it alone and `input` only treats it specially before `s`.
pub const SPECIAL_CHARS: &[char] = &[
    '\\', '"', '\'', '`', '$', '&', '|', ';', '<', '>', '(', ')', '*', '?', '!', '#', '~', '[',
    ']', '{', '}',
];

/// Android keycode for ENTER, sent after every injected line.
pub const KEYCODE_ENTER: u32 = 66;

pub fn encode_keystrokes(text: &str) -> Result<String, BridgeError> {
    let untypeable = |reason: String| BridgeError::Untypeable {
        text: text.to_string(),
        reason,
    };
    if text.contains("%s") {
        return Err(untypeable("a literal %s is always typed as a space".to_string()));
    }
    if let Some(c) = text.chars().find(|c| *c != ' ' && !c.is_ascii_graphic()) {
        return Err(untypeable(format!(
            "{:?} has no key; send multi-line input one line at a time",
            c
        )));
    }

    let mut encoded = String::with_capacity(text.len() * 2);
    for c in text.chars() {
        if c == ' ' {
            encoded.push_str("%s");
        } else if SPECIAL_CHARS.contains(&c) {
            encoded.push('\\');
            encoded.push(c);
        } else {
            encoded.push(c);
        }
    }
    Ok(encoded)
}

pub fn decode_keystrokes(encoded: &str) -> String {
    let mut decoded = String::with_capacity(encoded.len());
    let mut chars = encoded.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    decoded.push(escaped);
                }
            }
            '%' if chars.peek() == Some(&'s') => {
                chars.next();
                decoded.push(' ');
            }
            _ => decoded.push(c),
        }
    }
    decoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn encode(text: &str) -> String {
        encode_keystrokes(text).unwrap()
    }

    #[test]
    fn test_spaces_and_quotes() {
        let command = "print(cv2.imread('/sdcard/Download/ss.png').size)";
        let encoded = encode(command);
        assert_eq!(
            encoded,
            "print\\(cv2.imread\\(\\'/sdcard/Download/ss.png\\'\\).size\\)"
        );
        assert_eq!(decode_keystrokes(&encoded), command);
    }

    #[test]
    fn test_space_becomes_percent_s() {
        assert_eq!(encode("cp a b"), "cp%sa%sb");
        assert_eq!(decode_keystrokes("cp%sa%sb"), "cp a b");
    }

    #[test]
    fn test_percent_reaches_the_device_unescaped() {
        // `sh` would strip a backslash before `%`, so none is added
        let text = "echo 100% done";
        let encoded = encode(text);
        assert_eq!(encoded, "echo%s100%%sdone");
        assert!(!encoded.contains("\\%"));
        assert_eq!(decode_keystrokes(&encoded), text);
    }

    #[test]
    fn test_lines_input_cannot_reproduce_are_rejected() {
        for text in ["printf \"%s\" x", "a\tb", "first\nsecond", "caf\u{e9}"] {
            match encode_keystrokes(text) {
                Err(BridgeError::Untypeable { text: rejected, .. }) => assert_eq!(rejected, text),
                other => panic!("{:?} encoded as {:?}", text, other),
            }
        }
    }

    #[test]
    fn test_no_bare_spaces_or_quotes_in_output() {
        let encoded = encode("echo \"a b\" 'c'");
        assert!(!encoded.contains(' '));
        for (i, c) in encoded.char_indices() {
            if c == '"' || c == '\'' {
                assert_eq!(&encoded[i - 1..i], "\\");
            }
        }
    }

    proptest! {
        #[test]
        fn prop_round_trip(text in "[ -~]*") {
            match encode_keystrokes(&text) {
                Ok(encoded) => prop_assert_eq!(decode_keystrokes(&encoded), text),
                Err(_) => prop_assert!(text.contains("%s")),
            }
        }

        #[test]
        fn prop_control_characters_never_encode(
            head in "[a-z ]*",
            control in "[\t\n\r]",
            tail in "[a-z ]*",
        ) {
            let text = format!("{}{}{}", head, control, tail);
            prop_assert!(encode_keystrokes(&text).is_err());
        }

        #[test]
        fn prop_encoded_has_no_spaces(text in "[ a-z'\"%]*") {
            if let Ok(encoded) = encode_keystrokes(&text) {
                prop_assert!(!encoded.contains(' '));
            }
        }
    }
}
