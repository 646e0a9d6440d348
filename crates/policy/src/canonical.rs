//! Canonical tool naming.
//!
//! Planners and voice front-ends use short tool names; policy and audit work
//! on the dotted canonical form. Unknown names pass through unchanged.

/// Map a short tool name to its dotted canonical form.
pub fn canonical_tool_name(tool_name: &str) -> String {
    match tool_name {
        "keypress" => "input.keypress",
        "set_lights" => "sammi.set_lights",
        "music_next" => "sammi.music_next",
        "music_pause" => "sammi.music_pause",
        "music_resume" => "sammi.music_resume",
        "edparser_start" => "edparser.start",
        "edparser_stop" => "edparser.stop",
        "edparser_status" => "edparser.status",
        other => other,
    }
    .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_forms_map_to_dotted() {
        assert_eq!(canonical_tool_name("keypress"), "input.keypress");
        assert_eq!(canonical_tool_name("set_lights"), "sammi.set_lights");
        assert_eq!(canonical_tool_name("music_next"), "sammi.music_next");
        assert_eq!(canonical_tool_name("edparser_status"), "edparser.status");
    }

    #[test]
    fn unknown_and_canonical_pass_through() {
        assert_eq!(canonical_tool_name("input.keypress"), "input.keypress");
        assert_eq!(canonical_tool_name("twitch.redeem"), "twitch.redeem");
        assert_eq!(canonical_tool_name("web.search"), "web.search");
    }
}
