#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTag {
    pub name: String,
    pub attributes: Vec<(String, Option<String>)>,
}

impl StartTag {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_deref().unwrap_or(""))
    }

    pub fn classes(&self) -> Vec<&str> {
        self.attr("class")
            .map(|value| value.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().contains(&class)
    }
}

/// Parse the start tag at the beginning of `input`. Returns the tag and the
/// number of bytes it spans, including the closing `>`.
pub fn parse_start_tag(input: &str) -> Option<(StartTag, usize)> {
    let bytes = input.as_bytes();
    let len = bytes.len();
    if len < 2 || bytes[0] != b'<' || !bytes[1].is_ascii_alphabetic() {
        return None;
    }

    let mut k = 1;
    while k < len && bytes[k].is_ascii_alphanumeric() {
        k += 1;
    }
    let name = input[1..k].to_ascii_lowercase();
    let mut attributes = Vec::new();

    let skip_whitespace = |k: &mut usize| {
        while *k < len && bytes[*k].is_ascii_whitespace() {
            *k += 1;
        }
    };
    let is_name_char = |c: u8| c.is_ascii_alphanumeric() || c == b'-' || c == b'_' || c == b':';

    loop {
        skip_whitespace(&mut k);
        if k >= len {
            return None;
        }
        if bytes[k] == b'>' {
            k += 1;
            break;
        }
        if bytes[k] == b'/' {
            k += 1;
            continue;
        }
        let name_start = k;
        while k < len && is_name_char(bytes[k]) {
            k += 1;
        }
        if name_start == k {
            k += 1;
            continue;
        }
        let attribute_name = input[name_start..k].to_ascii_lowercase();

        skip_whitespace(&mut k);
        let value = if k < len && bytes[k] == b'=' {
            k += 1;
            skip_whitespace(&mut k);
            if k < len && (bytes[k] == b'"' || bytes[k] == b'\'') {
                let quote = bytes[k];
                k += 1;
                let value_start = k;
                while k < len && bytes[k] != quote {
                    k += 1;
                }
                let raw = &input[value_start..k];
                if k < len {
                    k += 1;
                }
                Some(decode_entities(raw))
            } else {
                let value_start = k;
                while k < len && !bytes[k].is_ascii_whitespace() && bytes[k] != b'>' {
                    k += 1;
                }
                Some(decode_entities(&input[value_start..k]))
            }
        } else {
            None
        };
        attributes.push((attribute_name, value));
    }

    Some((StartTag { name, attributes }, k))
}

/// First start tag named `name` anywhere in `fragment`.
pub fn find_start_tag(fragment: &str, name: &str) -> Option<StartTag> {
    fragment
        .match_indices('<')
        .filter_map(|(index, _)| parse_start_tag(&fragment[index..]))
        .map(|(tag, _)| tag)
        .find(|tag| tag.name.eq_ignore_ascii_case(name))
}

/// Text of a fragment with markup removed and entities decoded. A `<` that
/// does not open a tag, comment, or end tag is kept as text.
pub fn text_content(fragment: &str) -> String {
    let mut text = String::with_capacity(fragment.len());
    let mut rest = fragment;
    while let Some(index) = rest.find('<') {
        text.push_str(&rest[..index]);
        let candidate = &rest[index..];
        let opens_markup = candidate[1..]
            .chars()
            .next()
            .is_some_and(|ch| ch.is_ascii_alphabetic() || ch == '/' || ch == '!');
        match candidate.find('>') {
            Some(end) if opens_markup => rest = &candidate[end + 1..],
            _ => {
                text.push('<');
                rest = &candidate[1..];
            }
        }
    }
    text.push_str(rest);
    decode_entities(&text)
}

/// Named (the full HTML5 table), decimal, and hex references. Anything that
/// does not form a known reference is kept as written.
pub fn decode_entities(text: &str) -> String {
    html_escape::decode_html_entities(text).into_owned()
}
