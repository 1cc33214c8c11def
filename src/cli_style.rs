use clap::builder::styling::{AnsiColor, Color, Style};
use clap::builder::Styles;
use crossterm::style::{Attribute, Color as CtColor, Stylize};
use unicode_width::UnicodeWidthStr;

// ═══════════════════════════════════════════════════════════════════════════════
// Clap Styles
// ═══════════════════════════════════════════════════════════════════════════════

fn ansi(color: AnsiColor) -> Style {
    Style::new().fg_color(Some(Color::Ansi(color)))
}

pub fn get_styles() -> Styles {
    Styles::styled()
        .usage(ansi(AnsiColor::Yellow).bold().underline())
        .header(ansi(AnsiColor::Yellow).bold().underline())
        .literal(ansi(AnsiColor::Green).bold())
        .invalid(ansi(AnsiColor::Red).bold())
        .error(ansi(AnsiColor::Red).bold())
        .valid(ansi(AnsiColor::Green).bold())
        .placeholder(ansi(AnsiColor::BrightBlack))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Color Palette - Stage Lights
// ═══════════════════════════════════════════════════════════════════════════════

pub mod colors {
    use crossterm::style::Color;

    pub const AMBER: Color = Color::Rgb {
        r: 255,
        g: 191,
        b: 0,
    };
    pub const SPOT: Color = Color::Rgb {
        r: 255,
        g: 240,
        b: 200,
    };
    pub const TEAL: Color = Color::Rgb {
        r: 0,
        g: 200,
        b: 180,
    };
    pub const GREEN: Color = Color::Rgb {
        r: 80,
        g: 220,
        b: 100,
    };
    pub const RED: Color = Color::Rgb {
        r: 255,
        g: 85,
        b: 85,
    };
    pub const ORANGE: Color = Color::Rgb {
        r: 255,
        g: 140,
        b: 0,
    };
    pub const DIM: Color = Color::Rgb {
        r: 128,
        g: 128,
        b: 128,
    };
}

// ═══════════════════════════════════════════════════════════════════════════════
// Box Drawing Characters
// ═══════════════════════════════════════════════════════════════════════════════

pub mod box_chars {
    pub const HORIZONTAL: &str = "─";
    pub const VERTICAL: &str = "│";
    pub const ROUND_TOP_LEFT: &str = "╭";
    pub const ROUND_TOP_RIGHT: &str = "╮";
    pub const ROUND_BOTTOM_LEFT: &str = "╰";
    pub const ROUND_BOTTOM_RIGHT: &str = "╯";
    pub const T_LEFT: &str = "├";
    pub const T_RIGHT: &str = "┤";
    pub const T_TOP: &str = "┬";
    pub const T_BOTTOM: &str = "┴";
    pub const CROSS: &str = "┼";
    pub const NOTE: &str = "♪";
    pub const STAR: &str = "★";
    pub const CHECK: &str = "✓";
    pub const CROSS_MARK: &str = "✗";
}

// ═══════════════════════════════════════════════════════════════════════════════
// Banner
// ═══════════════════════════════════════════════════════════════════════════════

pub fn print_banner() {
    let banner = r#"
   ███████╗███████╗████████╗██╗     ██╗███████╗████████╗
   ██╔════╝██╔════╝╚══██╔══╝██║     ██║██╔════╝╚══██╔══╝
   ███████╗█████╗     ██║   ██║     ██║███████╗   ██║
   ╚════██║██╔══╝     ██║   ██║     ██║╚════██║   ██║
   ███████║███████╗   ██║   ███████╗██║███████║   ██║
   ╚══════╝╚══════╝   ╚═╝   ╚══════╝╚═╝╚══════╝   ╚═╝
"#;
    let gradient = [
        colors::SPOT,
        colors::SPOT,
        colors::AMBER,
        colors::AMBER,
        colors::ORANGE,
        colors::ORANGE,
        colors::RED,
    ];
    for (i, line) in banner.lines().enumerate() {
        let color = gradient.get(i).unwrap_or(&colors::AMBER);
        println!("{}", line.with(*color).bold());
    }
    println!(
        "{}",
        format!(
            "   ── catalog & setlists · v{} ({}) ──",
            env!("APP_VERSION"),
            env!("GIT_HASH")
        )
        .with(colors::DIM)
    );
    println!();
}

// ═══════════════════════════════════════════════════════════════════════════════
// Status Indicators
// ═══════════════════════════════════════════════════════════════════════════════

pub fn print_success(message: &str) {
    println!(
        " {} {}",
        box_chars::CHECK.with(colors::GREEN).bold(),
        message.with(colors::GREEN)
    );
}

pub fn print_error(message: &str) {
    println!(
        " {} {}",
        box_chars::CROSS_MARK.with(colors::RED).bold(),
        message.with(colors::RED)
    );
}

pub fn print_warning(message: &str) {
    println!(
        " {} {}",
        "⚠".with(colors::ORANGE).bold(),
        message.with(colors::ORANGE)
    );
}

pub fn print_key_value(key: &str, value: &str) {
    println!(
        "  {} {} {}",
        box_chars::NOTE.with(colors::AMBER),
        format!("{}:", key).with(colors::DIM),
        value.with(colors::SPOT)
    );
}

pub fn print_empty_list(message: &str) {
    println!(
        "  {}",
        message.with(colors::DIM).attribute(Attribute::Italic)
    );
}

/// "3:07" style duration; hours only when needed.
pub fn format_duration(total_seconds: i64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Table Display
// ═══════════════════════════════════════════════════════════════════════════════

pub struct TableBuilder {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    col_widths: Vec<usize>,
}

impl TableBuilder {
    pub fn new(headers: &[&str]) -> Self {
        TableBuilder {
            col_widths: headers.iter().map(|h| h.width()).collect(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn add_row(&mut self, row: Vec<String>) {
        for (width, cell) in self.col_widths.iter_mut().zip(&row) {
            *width = (*width).max(cell.width());
        }
        self.rows.push(row);
    }

    fn border(&self, left: &str, junction: &str, right: &str) {
        let segments: Vec<String> = self
            .col_widths
            .iter()
            .map(|w| box_chars::HORIZONTAL.repeat(w + 2))
            .collect();
        println!(
            "{}",
            format!("{}{}{}", left, segments.join(junction), right).with(colors::TEAL)
        );
    }

    fn line(&self, cells: &[String], color: CtColor, bold: bool) {
        print!("{}", box_chars::VERTICAL.with(colors::TEAL));
        for (i, width) in self.col_widths.iter().enumerate() {
            let cell = cells.get(i).map(String::as_str).unwrap_or("");
            let padded = format!(" {}{} ", cell, " ".repeat(width.saturating_sub(cell.width())));
            if bold {
                print!("{}", padded.with(color).bold());
            } else {
                print!("{}", padded.with(color));
            }
            print!("{}", box_chars::VERTICAL.with(colors::TEAL));
        }
        println!();
    }

    pub fn print(&self) {
        self.border(
            box_chars::ROUND_TOP_LEFT,
            box_chars::T_TOP,
            box_chars::ROUND_TOP_RIGHT,
        );
        self.line(&self.headers, colors::AMBER, true);
        self.border(box_chars::T_LEFT, box_chars::CROSS, box_chars::T_RIGHT);
        for row in &self.rows {
            self.line(row, colors::SPOT, false);
        }
        self.border(
            box_chars::ROUND_BOTTOM_LEFT,
            box_chars::T_BOTTOM,
            box_chars::ROUND_BOTTOM_RIGHT,
        );
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Prompt & Help
// ═══════════════════════════════════════════════════════════════════════════════

pub fn get_prompt(list_name: Option<&str>) -> String {
    match list_name {
        Some(name) => format!("{} {} ", name.with(colors::TEAL), "♪❯".with(colors::AMBER).bold()),
        None => format!("{} ", "♪❯".with(colors::AMBER).bold()),
    }
}

pub struct CommandHelp {
    pub name: &'static str,
    pub args: &'static str,
    pub description: &'static str,
}

pub fn print_help(groups: &[(&str, &[CommandHelp])]) {
    println!();
    for (title, commands) in groups {
        println!(
            "  {} {}",
            box_chars::STAR.with(colors::AMBER),
            title.with(colors::AMBER).bold()
        );
        for cmd in commands.iter() {
            println!(
                "      {} {}  {}",
                cmd.name.with(colors::GREEN).bold(),
                cmd.args.with(colors::DIM),
                cmd.description
            );
        }
        println!();
    }
}

pub fn print_goodbye() {
    println!();
    println!("  {}", "Break a leg!".with(colors::AMBER).bold());
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_are_compact() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(187), "3:07");
        assert_eq!(format_duration(3_725), "1:02:05");
    }
}
