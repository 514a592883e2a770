use console::{Emoji, style};

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", INFO_ICON, style(msg).blue());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_status(label: &str, msg: &str) {
    println!("  {} {}: {}", GEAR, style(label).bold().cyan(), msg);
}

pub fn print_banner() {
    println!();
    println!(
        "{}{}",
        ROCKET,
        style("spectrum-relay").bold().cyan()
    );
    println!(
        "{}\n",
        style("Spectrum lobby posts, relayed to Discord.").dim()
    );
}

pub fn print_goodbye() {
    println!(
        "\n{} {}",
        SPARKLE,
        style("spectrum-relay stopped. See you next time!").bold().cyan()
    );
}

enum GuideLine {
    Command(String, String),
    Text(String),
    Blank,
}

/// A titled block of help output.
pub struct GuideSection {
    title: String,
    lines: Vec<GuideLine>,
}

impl GuideSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            lines: Vec::new(),
        }
    }

    pub fn command(mut self, name: &str, about: &str) -> Self {
        self.lines
            .push(GuideLine::Command(name.to_string(), about.to_string()));
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.lines.push(GuideLine::Text(text.to_string()));
        self
    }

    pub fn blank(mut self) -> Self {
        self.lines.push(GuideLine::Blank);
        self
    }

    fn render(&self) -> String {
        let width = self
            .lines
            .iter()
            .filter_map(|l| match l {
                GuideLine::Command(name, _) => Some(name.chars().count()),
                _ => None,
            })
            .max()
            .unwrap_or(0);

        let mut out = format!("\n {}\n", style(&self.title).bold().underlined());
        for line in &self.lines {
            match line {
                GuideLine::Command(name, about) => out.push_str(&format!(
                    "   {}  {}\n",
                    style(format!("{:<width$}", name, width = width)).green(),
                    about
                )),
                GuideLine::Text(text) => out.push_str(&format!("   {}\n", text)),
                GuideLine::Blank => out.push('\n'),
            }
        }
        out
    }

    pub fn print(&self) {
        print!("{}", self.render());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_are_padded_to_the_widest_name() {
        console::set_colors_enabled(false);
        let rendered = GuideSection::new("Relay")
            .command("run", "Start")
            .command("recent", "Show")
            .render();
        assert!(rendered.contains("   run     Start\n"));
        assert!(rendered.contains("   recent  Show\n"));
    }

    #[test]
    fn blank_lines_separate_text() {
        let rendered = GuideSection::new("Options").text("a").blank().text("b").render();
        assert!(rendered.ends_with("   a\n\n   b\n"));
    }
}
