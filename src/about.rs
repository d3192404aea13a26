pub const AMINOSCAN_DISPLAY_VERSION: &str = env!("AMINOSCAN_DISPLAY_VERSION");
pub const AMINOSCAN_BUILD_N: &str = env!("AMINOSCAN_BUILD_N");

pub fn version_cli_text() -> String {
    format!(
        "aminoscan {}\nBuild {}\nProtein motif and domain annotation engine",
        AMINOSCAN_DISPLAY_VERSION, AMINOSCAN_BUILD_N
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_text_names_the_tool() {
        let text = version_cli_text();
        assert!(text.starts_with("aminoscan "));
        assert!(text.contains(AMINOSCAN_DISPLAY_VERSION));
    }
}
