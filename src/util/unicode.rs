use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

/// Display width in terminal cells. Tabs count as 4 cells.
pub fn display_width(s: &str) -> usize {
    s.graphemes(true).map(grapheme_display_width).sum()
}

/// Truncate a title to fit within `max_cells` terminal cells, appending `…` if truncated.
pub fn truncate_to_width(s: &str, max_cells: usize) -> String {
    if max_cells == 0 {
        return String::new();
    }
    if display_width(s) <= max_cells {
        return s.to_string();
    }
    let budget = max_cells - 1; // one cell for '…'
    let mut width = 0;
    let mut result = String::new();
    for grapheme in s.graphemes(true) {
        let gw = grapheme_display_width(grapheme);
        if width + gw > budget {
            break;
        }
        width += gw;
        result.push_str(grapheme);
    }
    result.push('\u{2026}');
    result
}

/// Right-pad with spaces to `cells` display cells (no-op if already wider)
pub fn pad_to_width(s: &str, cells: usize) -> String {
    let width = display_width(s);
    let mut out = s.to_string();
    if width < cells {
        out.push_str(&" ".repeat(cells - width));
    }
    out
}

fn grapheme_display_width(g: &str) -> usize {
    if g == "\t" {
        return 4;
    }
    UnicodeWidthStr::width(g)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_width() {
        assert_eq!(display_width("hello"), 5);
        assert_eq!(display_width("你好"), 4);
        assert_eq!(display_width("cafe\u{0301}"), 4);
        assert_eq!(display_width("a\tb"), 6);
    }

    #[test]
    fn test_truncate_ascii() {
        assert_eq!(truncate_to_width("Write the parser", 8), "Write t\u{2026}");
        assert_eq!(truncate_to_width("short", 10), "short");
        assert_eq!(truncate_to_width("anything", 0), "");
        assert_eq!(truncate_to_width("anything", 1), "\u{2026}");
    }

    #[test]
    fn test_truncate_does_not_split_wide_chars() {
        // budget of 4 cells fits two CJK characters, the third would overflow
        assert_eq!(truncate_to_width("你好世界", 5), "你好\u{2026}");
        assert_eq!(truncate_to_width("你好世界", 4), "你\u{2026}");
    }

    #[test]
    fn test_pad_to_width() {
        assert_eq!(pad_to_width("ab", 4), "ab  ");
        assert_eq!(pad_to_width("你", 3), "你 ");
        assert_eq!(pad_to_width("long", 2), "long");
    }
}
