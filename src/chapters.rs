use std::fmt::Write as _;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

const HEADER: &str = ";FFMETADATA1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    /// Seconds from the start of the stream.
    pub start_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ChapterError {
    #[error("chapter {index} has invalid {field}: {value}")]
    InvalidTime {
        index: usize,
        field: &'static str,
        value: f64,
    },

    #[error("chapter {index} starts before the chapter preceding it")]
    OutOfOrder { index: usize },

    #[error("chapter {index} ends before it starts")]
    EndBeforeStart { index: usize },
}

/// A non-empty, time-ordered chapter sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterList(Vec<Chapter>);

impl ChapterList {
    /// Validates `chapters`; an empty sequence yields `Ok(None)`.
    pub fn new(chapters: Vec<Chapter>) -> Result<Option<Self>, ChapterError> {
        let mut previous_start = 0.0_f64;
        for (index, chapter) in chapters.iter().enumerate() {
            check_time(index, "start_time", chapter.start_time)?;
            if chapter.start_time < previous_start {
                return Err(ChapterError::OutOfOrder { index });
            }
            if let Some(end_time) = chapter.end_time {
                check_time(index, "end_time", end_time)?;
                if end_time < chapter.start_time {
                    return Err(ChapterError::EndBeforeStart { index });
                }
            }
            previous_start = chapter.start_time;
        }

        if chapters.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self(chapters)))
    }

    pub fn as_slice(&self) -> &[Chapter] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn check_time(index: usize, field: &'static str, value: f64) -> Result<(), ChapterError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ChapterError::InvalidTime {
            index,
            field,
            value,
        })
    }
}

/// Reads the optional `chapters` form field.
///
/// Blank input or JSON that does not decode into chapters means "no chapters" and the conversion
/// proceeds without them. Chapters that decode but break ordering are rejected.
pub fn from_request_field(raw: Option<&str>) -> Result<Option<ChapterList>, ChapterError> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(None);
    };

    let chapters: Vec<Chapter> = match serde_json::from_str(raw) {
        Ok(chapters) => chapters,
        Err(err) => {
            tracing::warn!(%err, "ignoring malformed chapter list");
            return Ok(None);
        }
    };

    ChapterList::new(chapters)
}

/// Reads a chapter file given on the command line; unlike the form field, bad JSON is an error.
pub fn parse_strict(raw: &str) -> anyhow::Result<Option<ChapterList>> {
    let chapters: Vec<Chapter> = serde_json::from_str(raw).context("decode chapters json")?;
    Ok(ChapterList::new(chapters)?)
}

/// Renders chapters in FFmetadata form, times scaled to milliseconds.
///
/// A chapter's end is its own `end_time` or else the next chapter's start; the last chapter has
/// no end line.
pub fn format(chapters: &ChapterList) -> String {
    let mut out = String::new();
    out.push_str(HEADER);
    out.push('\n');

    let list = chapters.as_slice();
    for (index, chapter) in list.iter().enumerate() {
        out.push_str("[CHAPTER]\n");
        out.push_str("TIMEBASE=1/1000\n");
        let _ = writeln!(out, "START={}", to_millis(chapter.start_time));

        if let Some(next) = list.get(index + 1) {
            let end = chapter.end_time.unwrap_or(next.start_time);
            let _ = writeln!(out, "END={}", to_millis(end));
        }

        let _ = writeln!(out, "title={}", escape_value(&chapter.title));
        out.push('\n');
    }

    out
}

fn to_millis(seconds: f64) -> u64 {
    (seconds * 1000.0).round() as u64
}

fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '=' | ';' | '#' | '\\' | '\n') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(title: &str, start_time: f64, end_time: Option<f64>) -> Chapter {
        Chapter {
            title: title.to_owned(),
            start_time,
            end_time,
        }
    }

    fn list(chapters: Vec<Chapter>) -> ChapterList {
        ChapterList::new(chapters).unwrap().unwrap()
    }

    #[test]
    fn next_start_closes_open_chapter_and_last_has_no_end() {
        let text = format(&list(vec![
            chapter("A", 0.0, None),
            chapter("B", 30.0, None),
        ]));

        assert_eq!(
            text,
            ";FFMETADATA1\n\
             [CHAPTER]\nTIMEBASE=1/1000\nSTART=0\nEND=30000\ntitle=A\n\n\
             [CHAPTER]\nTIMEBASE=1/1000\nSTART=30000\ntitle=B\n\n"
        );
    }

    #[test]
    fn explicit_end_wins_and_final_end_is_dropped() {
        let text = format(&list(vec![
            chapter("Intro", 0.0, Some(12.5)),
            chapter("Outro", 20.0, Some(99.0)),
        ]));

        assert!(text.contains("START=0\nEND=12500\ntitle=Intro"));
        assert!(text.contains("START=20000\ntitle=Outro"));
        assert!(!text.contains("END=99000"));
    }

    #[test]
    fn times_round_to_nearest_millisecond() {
        let text = format(&list(vec![chapter("Only", 4.35, None)]));
        assert!(text.contains("START=4350\n"));
    }

    #[test]
    fn titles_are_escaped() {
        let text = format(&list(vec![chapter("a=b; #1 \\ x\ny", 0.0, None)]));
        assert!(text.contains("title=a\\=b\\; \\#1 \\\\ x\\\ny\n"));
    }

    #[test]
    fn unordered_chapters_are_rejected() {
        let err = ChapterList::new(vec![chapter("B", 30.0, None), chapter("A", 0.0, None)])
            .unwrap_err();
        assert!(matches!(err, ChapterError::OutOfOrder { index: 1 }));

        let err = ChapterList::new(vec![chapter("A", 10.0, Some(5.0))]).unwrap_err();
        assert!(matches!(err, ChapterError::EndBeforeStart { index: 0 }));

        let err = ChapterList::new(vec![chapter("A", -1.0, None)]).unwrap_err();
        assert!(matches!(err, ChapterError::InvalidTime { index: 0, .. }));
    }

    #[test]
    fn request_field_decodes_chapters() {
        let chapters = from_request_field(Some(
            r#"[{"title":"A","start_time":0},{"title":"B","start_time":30.5,"end_time":60}]"#,
        ))
        .unwrap()
        .unwrap();

        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters.as_slice()[1].end_time, Some(60.0));
    }

    #[test]
    fn malformed_request_field_means_no_chapters() {
        for raw in [
            "not json",
            r#"{"title":"A"}"#,
            r#"[{"title":"A"}]"#,
            r#"[{"title":"A","start_time":"zero"}]"#,
            "[]",
            "   ",
        ] {
            assert!(
                from_request_field(Some(raw)).unwrap().is_none(),
                "expected no chapters for {raw:?}"
            );
        }
        assert!(from_request_field(None).unwrap().is_none());
    }

    #[test]
    fn strict_parse_reports_bad_json() {
        assert!(parse_strict("not json").is_err());
        assert!(parse_strict("[]").unwrap().is_none());
        let err = parse_strict(r#"[{"title":"B","start_time":3},{"title":"A","start_time":1}]"#)
            .unwrap_err();
        assert!(format!("{err:#}").contains("starts before"));
    }
}
