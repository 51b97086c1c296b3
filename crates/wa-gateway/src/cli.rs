//! CLI (Command Line Interface) mode
//!
//! Interactive REPL over the dispatcher, plus a one-shot execute mode.

use nu_ansi_term::{Color, Style};
use reedline::{
    ColumnarMenu, Completer, DefaultHinter, Emacs, KeyCode, KeyModifiers, Keybindings,
    MenuBuilder, Prompt, Reedline, ReedlineEvent, ReedlineMenu, Signal, Suggestion,
};
use tracing::info;
use wa_core::{Dispatcher, Turn};

use crate::Runtime;

/// Available commands for autocomplete display
const COMMANDS: &[(&str, &str)] = &[
    ("/help", "Show this help"),
    ("/exit", "Quit"),
    ("/quit", "Quit"),
    ("/clear", "Start a new conversation"),
    ("/tools", "List available tools"),
];

/// Command completer for reedline
#[derive(Clone)]
pub struct CommandCompleter {
    commands: Vec<(&'static str, &'static str)>,
}

impl CommandCompleter {
    pub fn new() -> Self {
        Self {
            commands: COMMANDS.to_vec(),
        }
    }
}

impl Default for CommandCompleter {
    fn default() -> Self {
        Self::new()
    }
}

impl Completer for CommandCompleter {
    fn complete(&mut self, line: &str, pos: usize) -> Vec<Suggestion> {
        if !line.starts_with('/') {
            return Vec::new();
        }

        self.commands
            .iter()
            .filter(|(cmd, _)| cmd.starts_with(line))
            .map(|(cmd, desc)| Suggestion {
                value: cmd.to_string(),
                description: Some(desc.to_string()),
                extra: None,
                span: reedline::Span::new(0, pos),
                append_whitespace: true,
                style: None,
            })
            .collect()
    }
}

/// Custom prompt with colored styling
struct ColoredPrompt {
    style: Style,
}

impl ColoredPrompt {
    fn new() -> Self {
        Self {
            style: Color::Cyan.bold(),
        }
    }
}

impl Prompt for ColoredPrompt {
    fn render_prompt_left(&self) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Owned(self.style.paint("warehouse> ").to_string())
    }

    fn render_prompt_right(&self) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, _prompt_mode: reedline::PromptEditMode) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Borrowed("")
    }

    fn render_prompt_multiline_indicator(&self) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Borrowed("")
    }

    fn render_prompt_history_search_indicator(
        &self,
        _history_search: reedline::PromptHistorySearch,
    ) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Borrowed("")
    }
}

/// What the REPL should do after a slash command
#[derive(Debug, PartialEq)]
enum CommandOutcome {
    /// Not a command; send the line to the dispatcher
    NotCommand,
    Handled,
    Exit,
}

/// REPL state carried between lines
struct Session {
    id: String,
}

impl Session {
    fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// Run CLI interactive mode
pub async fn run_cli(runtime: &Runtime) -> anyhow::Result<()> {
    let dispatcher = runtime.dispatcher.as_ref();

    info!("Starting CLI mode with {} tools", dispatcher.tools().len());

    print_welcome();

    let mut keybindings = default_keybindings();

    // Trigger completion on '/' key
    keybindings.add_binding(
        KeyModifiers::NONE,
        KeyCode::Char('/'),
        ReedlineEvent::Edit(vec![reedline::EditCommand::Complete]),
    );

    let menu = Box::new(
        ColumnarMenu::default()
            .with_name("command_menu")
            .with_columns(1)
            .with_column_width(Some(40))
            .with_only_buffer_difference(false),
    );

    let hinter = DefaultHinter::default().with_style(Style::new().dimmed());

    let mut line_editor = Reedline::create()
        .with_completer(Box::new(CommandCompleter::new()))
        .with_menu(ReedlineMenu::EngineCompleter(menu))
        .with_hinter(Box::new(hinter))
        .with_edit_mode(Box::new(Emacs::new(keybindings)));

    let prompt = ColoredPrompt::new();
    let mut session = Session::new();

    loop {
        let signal = line_editor.read_line(&prompt);

        match signal {
            Ok(Signal::Success(line)) => {
                let input = line.trim();

                if input.is_empty() {
                    continue;
                }

                match handle_command(input, dispatcher, &mut session) {
                    CommandOutcome::Exit => {
                        println!("\nGoodbye!\n");
                        break;
                    }
                    CommandOutcome::Handled => continue,
                    CommandOutcome::NotCommand => {}
                }

                match dispatcher.run(input, Some(&session.id)).await {
                    Ok(turn) => print_turn(&turn),
                    Err(e) => match e.apology() {
                        Some(apology) => println!("\n{}\n", apology),
                        None => eprintln!("\n{} {}\n", Color::Red.paint("Error:"), e),
                    },
                }
            }
            Ok(Signal::CtrlC) => {
                println!("^C");
                continue;
            }
            Ok(Signal::CtrlD) => {
                println!("\nGoodbye!\n");
                break;
            }
            Err(err) => {
                eprintln!("\nError: {}\n", err);
                break;
            }
        }
    }

    Ok(())
}

/// Default keybindings for reedline
fn default_keybindings() -> Keybindings {
    let mut keybindings = Keybindings::new();
    keybindings.add_binding(
        KeyModifiers::NONE,
        KeyCode::Tab,
        ReedlineEvent::Edit(vec![reedline::EditCommand::Complete]),
    );
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Enter, ReedlineEvent::Submit);
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Esc, ReedlineEvent::Esc);
    keybindings.add_binding(KeyModifiers::CONTROL, KeyCode::Char('c'), ReedlineEvent::CtrlC);
    keybindings.add_binding(KeyModifiers::CONTROL, KeyCode::Char('d'), ReedlineEvent::CtrlD);
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Up, ReedlineEvent::Up);
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Down, ReedlineEvent::Down);
    keybindings
}

/// Handle special commands (/exit, /clear, /help, /tools)
fn handle_command(input: &str, dispatcher: &Dispatcher, session: &mut Session) -> CommandOutcome {
    let lower = input.to_lowercase();

    match lower.as_str() {
        "/exit" | "/quit" | "/q" => CommandOutcome::Exit,
        "/clear" => {
            if dispatcher.has_memory() {
                if let Err(e) = dispatcher.forget(&session.id) {
                    eprintln!("\nCould not clear session {}: {}\n", session.id, e);
                }
            }
            *session = Session::new();
            println!("\nStarted a new conversation.\n");
            CommandOutcome::Handled
        }
        "/help" | "/?" => {
            print_help();
            CommandOutcome::Handled
        }
        "/tools" => {
            println!();
            println!("{}", dispatcher.tools().describe());
            println!();
            CommandOutcome::Handled
        }
        _ if lower.starts_with('/') => {
            eprintln!("\nUnknown command: {}. Type /help for the command list.\n", input);
            CommandOutcome::Handled
        }
        _ => CommandOutcome::NotCommand,
    }
}

fn print_turn(turn: &Turn) {
    for step in &turn.steps {
        println!(
            "{} {}: {}",
            Style::new().dimmed().paint("->"),
            Color::Yellow.paint(step.tool.as_str()),
            Style::new().dimmed().paint(step.input.as_str())
        );
    }
    println!("\n{}\n", turn.answer);
}

fn print_welcome() {
    println!();
    println!("warehouse-agent CLI");
    println!("Ask a question about your orders and press Enter.");
    println!("Commands: /help, /exit, /clear, /tools  (type / for suggestions)");
    println!();
}

fn print_help() {
    println!();
    println!("Available commands:");
    for (cmd, desc) in COMMANDS {
        println!("  {} - {}", cmd, desc);
    }
    println!();
}

/// Answer one question and return; any failure becomes exit code 1.
pub async fn run_execute(runtime: &Runtime, question: &str) -> anyhow::Result<()> {
    let question = question.trim();
    if question.is_empty() {
        eprintln!("Error: the question is empty");
        runtime.close().await;
        std::process::exit(1);
    }

    info!("Starting execute mode with {} tools", runtime.dispatcher.tools().len());

    match runtime.dispatcher.run(question, None).await {
        Ok(turn) => {
            println!("{}", turn.answer);
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {}", e.apology().unwrap_or_else(|| e.to_string()));
            runtime.close().await;
            std::process::exit(1);
        }
    }
}
