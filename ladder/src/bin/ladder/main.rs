mod commands;
mod context;
mod examples;
mod output;
mod theme;
mod utils;

use anyhow::Result;
use clap::{
    ColorChoice, Command, CommandFactory, FromArgMatches, Parser,
    builder::{
        Styles,
        styling::{AnsiColor, Color as ClapColor, RgbColor, Style},
    },
    error::ErrorKind,
};
use colored::{Color as ThemeColor, Colorize, control::ShouldColorize};
use std::fmt::Write;
use std::io::{self, Write as IoWrite};
use std::path::PathBuf;

use commands::migrate::{MigrateCommands, handle_migrate_commands};
use examples::{ExampleGroup, command_examples};
use output::{GlobalOptions, OutputFormat, OutputManager};
use theme::{ICONS, THEME};

const ENVIRONMENT_VARIABLES: &[(&str, &str)] = &[
    ("LADDER_DATABASE", "Path to the SQLite database file"),
    ("RUST_LOG", "Log filter, overrides the level chosen by --verbose/--quiet"),
];

#[derive(Parser)]
#[command(name = "ladder")]
#[command(version)]
#[command(
    about = "Ordered, reversible schema migrations for SQLite",
    long_about = r#"Schema migration runner for SQLite that provides:

• Ordered migrations, each applied in its own transaction
• A persisted log of executed migrations
• Reverse-order rollback of everything that ran
• Plain SQL migration files with `-- up` / `-- down` sections

Commands:
  run      Apply pending migrations
  clear    Roll back executed migrations
  drop     Drop every table in the database
  status   Show applied and pending migrations
"#
)]
#[command(subcommand_required = true, arg_required_else_help = true)]
struct Cli {
    /// SQLite database file (overrides [database] path in ladder.toml)
    #[arg(long, global = true, env = "LADDER_DATABASE")]
    database: Option<PathBuf>,

    /// Config file (defaults to the nearest ladder.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "table", global = true)]
    output: OutputFormat,

    /// Suppress output (only errors will be shown)
    #[arg(short = 'q', long, global = true)]
    quiet: bool,

    /// Enable verbose output
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: MigrateCommands,
}

impl Cli {
    fn parse_with_styles() -> Self {
        let command = build_cli_command();
        let matches = command.styles(help_styles()).try_get_matches();
        match matches.and_then(|matches| Cli::from_arg_matches(&matches)) {
            Ok(cli) => cli,
            Err(err) => match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                    let _ = print_blank_line(&mut io::stdout());
                    if let Err(print_err) = err.print()
                        && print_err.kind() != io::ErrorKind::BrokenPipe
                    {
                        eprintln!("Failed to display help: {print_err}");
                    }
                    std::process::exit(0);
                }
                _ => {
                    let _ = print_blank_line(&mut io::stderr());
                    if let Err(print_err) = err.print()
                        && print_err.kind() != io::ErrorKind::BrokenPipe
                    {
                        eprintln!("Failed to display error: {print_err}");
                    }
                    std::process::exit(err.exit_code());
                }
            },
        }
    }
}

fn build_cli_command() -> Command {
    let use_color = ShouldColorize::from_env().should_colorize();
    let mut command = Cli::command()
        .after_long_help(render_top_level_appendix(use_color))
        .color(if use_color {
            ColorChoice::Auto
        } else {
            ColorChoice::Never
        });

    for example in command_examples() {
        if let Some(subcommand) = command.find_subcommand_mut(example.name) {
            let help_text = render_examples(example.groups, use_color);
            *subcommand = subcommand.clone().after_long_help(help_text);
        }
    }
    command
}

fn render_examples(groups: &[ExampleGroup], use_color: bool) -> String {
    let mut buffer = String::new();
    let _ = writeln!(buffer, "{}", stylize("Examples:", THEME.highlight, true, use_color));

    for (index, group) in groups.iter().enumerate() {
        let _ = writeln!(buffer, "  {}", stylize(group.title, THEME.primary, true, use_color));

        for command in group.commands {
            let arrow = stylize(ICONS.arrow, THEME.muted, false, use_color);
            let _ = writeln!(buffer, "    {arrow} {}", stylize(command, THEME.key, false, use_color));
        }

        if index + 1 < groups.len() {
            buffer.push('\n');
        }
    }

    buffer
}

fn render_top_level_appendix(use_color: bool) -> String {
    let mut buffer = String::new();

    let env_heading = stylize("Environment Variables:", THEME.highlight, true, use_color);
    let _ = writeln!(buffer, "{env_heading}");
    for (key, description) in ENVIRONMENT_VARIABLES {
        let key_text = stylize(key, THEME.key, true, use_color);
        let value_text = stylize(description, THEME.value, false, use_color);
        let _ = writeln!(buffer, "  {key_text}  {value_text}");
    }

    buffer.push('\n');

    let tip_heading = stylize("Tip:", THEME.highlight, true, use_color);
    let tip_text = stylize(
        "Use 'ladder <command> --help' to view examples for each command.",
        THEME.muted,
        false,
        use_color,
    );
    let _ = writeln!(buffer, "{tip_heading} {tip_text}");

    buffer
}

fn print_blank_line(out: &mut impl IoWrite) -> io::Result<()> {
    out.write_all(b"\n")?;
    out.flush()
}

fn stylize(text: &str, color: ThemeColor, bold: bool, use_color: bool) -> String {
    match (use_color, bold) {
        (false, _) => text.to_string(),
        (true, true) => text.color(color).bold().to_string(),
        (true, false) => text.color(color).to_string(),
    }
}

fn help_styles() -> Styles {
    Styles::styled()
        .usage(style_from_color(THEME.primary).bold())
        .header(style_from_color(THEME.highlight).bold())
        .literal(style_from_color(THEME.key))
        .placeholder(style_from_color(THEME.muted))
        .valid(style_from_color(THEME.success))
        .invalid(style_from_color(THEME.warning))
        .error(style_from_color(THEME.error).bold())
}

fn style_from_color(color: ThemeColor) -> Style {
    let clap_color = match color {
        ThemeColor::TrueColor { r, g, b } => ClapColor::Rgb(RgbColor(r, g, b)),
        ThemeColor::Red => ClapColor::Ansi(AnsiColor::Red),
        ThemeColor::Green => ClapColor::Ansi(AnsiColor::Green),
        ThemeColor::Yellow => ClapColor::Ansi(AnsiColor::Yellow),
        ThemeColor::Blue => ClapColor::Ansi(AnsiColor::Blue),
        ThemeColor::Cyan => ClapColor::Ansi(AnsiColor::Cyan),
        ThemeColor::BrightBlack => ClapColor::Ansi(AnsiColor::BrightBlack),
        ThemeColor::BrightBlue => ClapColor::Ansi(AnsiColor::BrightBlue),
        ThemeColor::BrightCyan => ClapColor::Ansi(AnsiColor::BrightCyan),
        _ => ClapColor::Ansi(AnsiColor::White),
    };
    Style::new().fg_color(Some(clap_color))
}

fn init_logging(cli: &Cli) {
    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

fn main() {
    let cli = Cli::parse_with_styles();
    init_logging(&cli);

    let _ = print_blank_line(&mut io::stdout());

    if execute(cli).is_err() {
        let _ = print_blank_line(&mut io::stdout());
        std::process::exit(1);
    }

    let _ = print_blank_line(&mut io::stdout());
}

fn execute(cli: Cli) -> Result<()> {
    let output = OutputManager::new(GlobalOptions {
        output_format: cli.output,
        quiet: cli.quiet,
        verbose: cli.verbose,
        no_color: cli.no_color,
    });

    if let Err(err) = handle_migrate_commands(
        cli.command,
        cli.database.as_deref(),
        cli.config.as_deref(),
        &output,
    ) {
        output.error(&format!("{err:#}"));
        return Err(err);
    }

    Ok(())
}
