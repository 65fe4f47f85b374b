//! Position-aware scanning of iCalendar text.
//!
//! The scanner never normalizes anything: every content line remembers the
//! exact byte range it was read from (folded continuations included) and the
//! terminator of its last physical line, so a single property can later be
//! swapped out without disturbing its neighbours.

use std::ops::Range;

/// One logical (unfolded) content line.
#[derive(Debug, Clone)]
pub(crate) struct ContentLine<'a> {
    /// Bytes of every physical line making up this content line, terminators included.
    pub range: Range<usize>,
    /// 1-based number of the first physical line.
    pub line_no: usize,
    /// Unfolded text without any line terminator.
    pub text: String,
    /// Terminator of the last physical line (`"\r\n"`, `"\n"`, or empty at EOF).
    pub terminator: &'a str,
    pub folded: bool,
}

impl ContentLine<'_> {
    /// Property name, e.g. `DTSTART` for `DTSTART;TZID=Europe/Paris:20250101T090000`.
    pub fn name(&self) -> &str {
        let text = self.text.trim_start_matches('\u{feff}');
        let end = text.find([';', ':']).unwrap_or(text.len());
        &text[..end]
    }

    pub fn is(&self, name: &str) -> bool {
        self.name().eq_ignore_ascii_case(name)
    }

    /// Index of the colon separating name/parameters from the value.
    /// Colons inside quoted parameter values are skipped.
    fn value_separator(&self) -> Option<usize> {
        let mut quoted = false;
        for (i, c) in self.text.char_indices() {
            match c {
                '"' => quoted = !quoted,
                ':' if !quoted => return Some(i),
                _ => {}
            }
        }
        None
    }

    /// Everything before the value separator (name and parameters).
    pub fn prefix(&self) -> &str {
        match self.value_separator() {
            Some(i) => &self.text[..i],
            None => &self.text,
        }
    }

    pub fn value(&self) -> &str {
        match self.value_separator() {
            Some(i) => &self.text[i + 1..],
            None => "",
        }
    }

    /// Look up a parameter value (unquoted), case-insensitive on the key.
    pub fn param(&self, key: &str) -> Option<&str> {
        let prefix = self.prefix();
        split_unquoted(prefix, ';').skip(1).find_map(|param| {
            let (k, v) = param.split_once('=')?;
            k.eq_ignore_ascii_case(key).then(|| v.trim_matches('"'))
        })
    }

    /// Name and parameters with the parameter `key` left out.
    pub fn prefix_without(&self, key: &str) -> String {
        split_unquoted(self.prefix(), ';')
            .enumerate()
            .filter(|(i, part)| {
                *i == 0
                    || !part
                        .split_once('=')
                        .is_some_and(|(k, _)| k.eq_ignore_ascii_case(key))
            })
            .map(|(_, part)| part)
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Whether this is `BEGIN:<component>` / `END:<component>` for the given marker.
    fn is_marker(&self, marker: &str, component: &str) -> bool {
        self.is(marker) && self.value().trim().eq_ignore_ascii_case(component)
    }

    fn marker_component(&self, marker: &str) -> Option<&str> {
        self.is(marker).then(|| self.value().trim())
    }
}

fn split_unquoted(s: &str, sep: char) -> impl Iterator<Item = &str> {
    let mut parts = Vec::new();
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        if c == '"' {
            quoted = !quoted;
        } else if c == sep && !quoted {
            parts.push(&s[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&s[start..]);
    parts.into_iter()
}

/// A `BEGIN:VEVENT` … `END:VEVENT` block, as indexes into [`Scan::lines`].
#[derive(Debug, Clone)]
pub(crate) struct EventBlock {
    pub first: usize,
    pub last: usize,
    pub terminated: bool,
    /// The event's own properties (nested components such as VALARM excluded).
    pub own: Vec<usize>,
}

impl EventBlock {
    pub fn range(&self, scan: &Scan) -> Range<usize> {
        scan.lines[self.first].range.start..scan.lines[self.last].range.end
    }

    pub fn line_no(&self, scan: &Scan) -> usize {
        scan.lines[self.first].line_no
    }

    pub fn prop<'s, 'a>(&self, scan: &'s Scan<'a>, name: &str) -> Option<&'s ContentLine<'a>> {
        self.own
            .iter()
            .map(|&i| &scan.lines[i])
            .find(|line| line.is(name))
    }

    pub fn uid(&self, scan: &Scan) -> Option<String> {
        self.prop(scan, "UID")
            .map(|line| line.value().trim().to_string())
            .filter(|uid| !uid.is_empty())
    }
}

#[derive(Debug)]
pub(crate) struct Scan<'a> {
    pub lines: Vec<ContentLine<'a>>,
    pub blocks: Vec<EventBlock>,
    pub has_envelope: bool,
}

/// Split raw text into content lines and locate every event block.
pub(crate) fn scan(raw: &str) -> Scan<'_> {
    let lines = content_lines(raw);

    let mut blocks = Vec::new();
    let mut open: Option<(EventBlock, usize)> = None;
    let mut saw_begin = false;
    let mut saw_end = false;

    for (i, line) in lines.iter().enumerate() {
        if let Some((mut block, depth)) = open.take() {
            if line.is_marker("BEGIN", "VEVENT") {
                // A new event before the previous one ended: the previous one is cut short.
                block.last = i - 1;
                blocks.push(block);
                open = Some((new_block(i), 1));
                continue;
            }
            if line.marker_component("BEGIN").is_some() {
                block.last = i;
                open = Some((block, depth + 1));
                continue;
            }
            if let Some(component) = line.marker_component("END") {
                if depth == 1 && component.eq_ignore_ascii_case("VEVENT") {
                    block.last = i;
                    block.terminated = true;
                    blocks.push(block);
                } else if depth > 1 {
                    block.last = i;
                    open = Some((block, depth - 1));
                } else {
                    // END of an enclosing component: the event never closed.
                    block.last = i - 1;
                    blocks.push(block);
                    saw_end |= line.is_marker("END", "VCALENDAR");
                }
                continue;
            }
            if depth == 1 {
                block.own.push(i);
            }
            block.last = i;
            open = Some((block, depth));
            continue;
        }

        if line.is_marker("BEGIN", "VEVENT") {
            open = Some((new_block(i), 1));
        } else if line.is_marker("BEGIN", "VCALENDAR") {
            saw_begin = true;
        } else if line.is_marker("END", "VCALENDAR") {
            saw_end = true;
        }
    }

    if let Some((block, _)) = open {
        blocks.push(block);
    }

    Scan {
        lines,
        blocks,
        has_envelope: saw_begin && saw_end,
    }
}

fn new_block(first: usize) -> EventBlock {
    EventBlock {
        first,
        last: first,
        terminated: false,
        own: Vec::new(),
    }
}

/// Group physical lines into unfolded content lines (RFC 5545 §3.1).
fn content_lines(raw: &str) -> Vec<ContentLine<'_>> {
    let mut lines: Vec<ContentLine> = Vec::new();
    let mut offset = 0;

    for (idx, physical) in raw.split_inclusive('\n').enumerate() {
        let body = physical
            .strip_suffix("\r\n")
            .or_else(|| physical.strip_suffix('\n'))
            .unwrap_or(physical);
        let terminator = &physical[body.len()..];
        let range = offset..offset + physical.len();
        offset = range.end;

        if body.starts_with([' ', '\t']) {
            if let Some(current) = lines.last_mut() {
                current.text.push_str(&body[1..]);
                current.range.end = range.end;
                current.terminator = terminator;
                current.folded = true;
                continue;
            }
        }

        lines.push(ContentLine {
            range,
            line_no: idx + 1,
            text: body.to_string(),
            terminator,
            folded: false,
        });
    }

    lines
}
