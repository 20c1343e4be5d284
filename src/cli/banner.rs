//! Startup banner.

use std::env;

const BANNER: &str = r#"
  ______          _ _   _     _
 |  ____|        | | | | |   (_)
 | |__ __ _ _   _| | |_| |    _ _ __   ___
 |  __/ _` | | | | | __| |   | | '_ \ / _ \
 | | | (_| | |_| | | |_| |___| | | | |  __/
 |_|  \__,_|\__,_|_|\__|______|_|_| |_|\___|

        failure testing for APIs and databases
"#;

pub fn print() {
    if enabled() {
        println!("{BANNER}");
    }
}

fn enabled() -> bool {
    env::var("FAULTLINE_NO_BANNER").map(|v| v != "1").unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banner_suppression() {
        env::set_var("FAULTLINE_NO_BANNER", "1");
        assert!(!enabled());
        env::set_var("FAULTLINE_NO_BANNER", "0");
        assert!(enabled());
        env::remove_var("FAULTLINE_NO_BANNER");
        assert!(enabled());
    }
}
