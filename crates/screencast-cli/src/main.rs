use anyhow::{Context, Result, bail};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};
use screencast_config::Config;
use screencast_engine::{
    Command, CommandKind, IdleState, JsonFileBackend, Mode, Motion, PlayState,
    PlayerOptions, Position, ProjectStore, RecorderOptions, RopeDocument, Session, SessionOptions,
    StoreOptions, SystemClock,
};
use std::{
    env,
    fs::{self, OpenOptions},
    io::{Stdout, stdout},
    path::{Path, PathBuf},
    process,
    rc::Rc,
    time::{Duration, Instant},
};

/// Longest the loop sleeps when nothing is scheduled
const IDLE_POLL: Duration = Duration::from_millis(250);

const USAGE: &str = "\
Usage:
  screencast list
  screencast record <project> [file]
  screencast play <project> [breakpoint]
  screencast delete <project>...";

enum Invocation {
    List,
    Record {
        project: String,
        file: Option<PathBuf>,
    },
    Play {
        project: String,
        breakpoint: Option<String>,
    },
    Delete {
        projects: Vec<String>,
    },
}

fn parse_args(args: &[String]) -> Option<Invocation> {
    let (command, rest) = args.split_first()?;
    match (command.as_str(), rest) {
        ("list", []) => Some(Invocation::List),
        ("record", [project]) => Some(Invocation::Record {
            project: project.clone(),
            file: None,
        }),
        ("record", [project, file]) => Some(Invocation::Record {
            project: project.clone(),
            file: Some(PathBuf::from(file)),
        }),
        ("play", [project]) => Some(Invocation::Play {
            project: project.clone(),
            breakpoint: None,
        }),
        ("play", [project, breakpoint]) => Some(Invocation::Play {
            project: project.clone(),
            breakpoint: Some(breakpoint.clone()),
        }),
        ("delete", projects) if !projects.is_empty() => Some(Invocation::Delete {
            projects: projects.to_vec(),
        }),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    Record,
    Play,
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

struct App {
    session: Session<RopeDocument>,
    screen: Screen,
    /// Breakpoint name being typed after Ctrl-B
    prompt: Option<String>,
    status: String,
}

impl App {
    fn new(session: Session<RopeDocument>, screen: Screen) -> Self {
        let status = match screen {
            Screen::Record => "Recording. Ctrl-B adds a breakpoint, Esc stops.".to_string(),
            Screen::Play => "Playing. Space pauses and resumes, q stops.".to_string(),
        };
        Self {
            session,
            screen,
            prompt: None,
            status,
        }
    }

    fn dispatch(&mut self, command: Command) {
        if let Err(e) = self.session.dispatch(command) {
            log::warn!("{e}");
            self.status = e.to_string();
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Result<Flow> {
        match self.screen {
            Screen::Record => self.handle_record_key(key),
            Screen::Play => Ok(self.handle_play_key(key)),
        }
    }

    fn handle_record_key(&mut self, key: KeyEvent) -> Result<Flow> {
        if let Some(name) = self.prompt.as_mut() {
            match key.code {
                KeyCode::Char(c) => name.push(c),
                KeyCode::Backspace => {
                    name.pop();
                }
                KeyCode::Enter => {
                    let name = self.prompt.take().unwrap_or_default();
                    self.add_breakpoint(name);
                }
                KeyCode::Esc => self.prompt = None,
                _ => {}
            }
            return Ok(Flow::Continue);
        }

        match key.code {
            KeyCode::Esc => {
                self.dispatch(Command::StopRecording);
                return Ok(Flow::Quit);
            }
            KeyCode::Char('b') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.prompt = Some(String::new());
            }
            KeyCode::Char(c) => self.type_text(&c.to_string())?,
            KeyCode::Enter => self.type_text("\n")?,
            KeyCode::Tab => self.type_text("    ")?,
            KeyCode::Backspace => self.delete_backward()?,
            KeyCode::Left => self.move_caret(Motion::Left),
            KeyCode::Right => self.move_caret(Motion::Right),
            KeyCode::Up => self.move_caret(Motion::Up),
            KeyCode::Down => self.move_caret(Motion::Down),
            KeyCode::Home => self.move_caret(Motion::LineStart),
            KeyCode::End => self.move_caret(Motion::LineEnd),
            _ => {}
        }
        Ok(Flow::Continue)
    }

    fn handle_play_key(&mut self, key: KeyEvent) -> Flow {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                if matches!(self.session.mode(), Mode::Playing(_)) {
                    self.dispatch(Command::StopPlaying);
                }
                Flow::Quit
            }
            KeyCode::Char(' ') => {
                match self.session.mode() {
                    Mode::Playing(PlayState::Playing) => self.dispatch(Command::Pause),
                    Mode::Playing(PlayState::Paused) => self.dispatch(Command::Play),
                    _ => {}
                }
                Flow::Continue
            }
            _ => Flow::Continue,
        }
    }

    fn add_breakpoint(&mut self, name: String) {
        let name = if name.trim().is_empty() {
            let count = self
                .session
                .project()
                .map(|p| p.borrow().breakpoints().len())
                .unwrap_or(0);
            format!("Breakpoint {}", count + 1)
        } else {
            name
        };
        self.status = format!("Added breakpoint {name:?}");
        self.dispatch(Command::AddBreakpoint(name));
    }

    fn type_text(&mut self, text: &str) -> Result<()> {
        let Some(editor) = self.session.editor_mut() else {
            return Ok(());
        };
        let edit = editor.replace_selection(text)?;
        let selections = editor.selections().to_vec();
        self.session.on_document_changed(&[edit]);
        self.session.on_selection_changed(&selections);
        Ok(())
    }

    fn delete_backward(&mut self) -> Result<()> {
        let Some(editor) = self.session.editor_mut() else {
            return Ok(());
        };
        let Some(edit) = editor.delete_backward()? else {
            return Ok(());
        };
        let selections = editor.selections().to_vec();
        self.session.on_document_changed(&[edit]);
        self.session.on_selection_changed(&selections);
        Ok(())
    }

    fn move_caret(&mut self, motion: Motion) {
        let Some(editor) = self.session.editor_mut() else {
            return;
        };
        let selection = editor.move_caret(motion);
        self.session.on_selection_changed(&[selection]);
    }
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let Some(invocation) = parse_args(&args) else {
        eprintln!("{USAGE}");
        process::exit(1);
    };

    let config = match Config::load_or_default() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: Failed to load config file: {e}");
            eprintln!("Fix or remove {}", Config::config_path().display());
            process::exit(1);
        }
    };

    init_logging(&config.store_path.with_extension("log"))?;
    log::info!("using store {}", config.store_path.display());

    let clock = Rc::new(SystemClock);
    let store = ProjectStore::open(
        JsonFileBackend::new(&config.store_path),
        StoreOptions {
            debounce_window: config.recording.debounce_window(),
        },
        clock.clone(),
    )
    .with_context(|| format!("opening {}", config.store_path.display()))?;
    let mut session = Session::new(
        store,
        clock,
        SessionOptions {
            player: PlayerOptions {
                tick_interval: config.playback.tick_interval(),
            },
            recorder: RecorderOptions {
                interpolate: config.recording.interpolate,
            },
        },
    );

    match invocation {
        Invocation::List => list(&session),
        Invocation::Delete { projects } => {
            let (deleted, unknown) = delete_projects(&mut session, projects)?;
            if !unknown.is_empty() {
                eprintln!("No such project: {}", unknown.join(", "));
            }
            if deleted.is_empty() {
                process::exit(1);
            }
            println!("Deleted {}", deleted.join(", "));
            Ok(())
        }
        Invocation::Record { project, file } => {
            prepare_recording(&mut session, &project, file.as_deref())?;
            run_tui(App::new(session, Screen::Record))
        }
        Invocation::Play {
            project,
            breakpoint,
        } => {
            prepare_playback(&mut session, &project, breakpoint.as_deref())?;
            run_tui(App::new(session, Screen::Play))
        }
    }
}

fn init_logging(log_path: &Path) -> Result<()> {
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("opening log file {}", log_path.display()))?;

    // The terminal belongs to the TUI, so logs go to a file
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
    Ok(())
}

fn list(session: &Session<RopeDocument>) -> Result<()> {
    let projects = session.store().list();
    if projects.is_empty() {
        println!("No projects yet. Start one with: screencast record <project>");
        return Ok(());
    }
    for project in projects {
        println!("{} ({} changes)", project.id, project.total_change_count);
        for (i, breakpoint) in project.breakpoints.iter().enumerate() {
            println!(
                "  {}. {} ({} changes) [{}]",
                i + 1,
                breakpoint.name,
                breakpoint.change_count,
                breakpoint.id
            );
        }
    }
    Ok(())
}

/// Delete the projects that exist. Returns the deleted ids and the unknown
/// ones.
fn delete_projects(
    session: &mut Session<RopeDocument>,
    projects: Vec<String>,
) -> Result<(Vec<String>, Vec<String>)> {
    let (known, unknown): (Vec<_>, Vec<_>) = projects
        .into_iter()
        .partition(|id| session.store().has(id));
    if !known.is_empty() {
        session.dispatch(Command::DeleteProjects(known.clone()))?;
    }
    Ok((known, unknown))
}

fn prepare_recording(
    session: &mut Session<RopeDocument>,
    project: &str,
    file: Option<&Path>,
) -> Result<()> {
    let command = if session.store().has(project) {
        Command::SelectProject(project.to_string())
    } else {
        Command::CreateProject(project.to_string())
    };
    session.dispatch(command)?;

    let editor = recording_editor(session, project, file)?;
    session.attach_editor(editor);
    session.dispatch(Command::Record)?;
    Ok(())
}

/// The editor a recording starts from. A project with history continues from
/// the end of its replay, so recording it from a file is refused.
fn recording_editor(
    session: &Session<RopeDocument>,
    project: &str,
    file: Option<&Path>,
) -> Result<RopeDocument> {
    let history = session
        .project()
        .filter(|p| p.borrow().data().has_history())
        .map(|p| p.borrow().play_data());
    match (file, history) {
        (Some(path), Some(_)) => bail!(
            "project {project} already has recorded changes; record it without {}",
            path.display()
        ),
        (Some(path), None) => {
            let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            RopeDocument::from_bytes(&bytes)
        }
        // Carry on from where the recording left off
        (None, Some(play)) => Ok(RopeDocument::from_play_data(&play)),
        (None, None) => Ok(RopeDocument::default()),
    }
}

fn prepare_playback(
    session: &mut Session<RopeDocument>,
    project: &str,
    breakpoint: Option<&str>,
) -> Result<()> {
    session.dispatch(Command::SelectProject(project.to_string()))?;
    session.attach_editor(RopeDocument::default());

    let Some(wanted) = breakpoint else {
        session.dispatch(Command::Play)?;
        return Ok(());
    };
    let id = session.project().and_then(|p| {
        let p = p.borrow();
        let breakpoints = p.breakpoints();
        breakpoints
            .iter()
            .find(|b| b.id == wanted || b.name == wanted)
            .or_else(|| {
                let number: usize = wanted.parse().ok()?;
                breakpoints.get(number.checked_sub(1)?)
            })
            .map(|b| b.id.clone())
    });
    let Some(id) = id else {
        bail!("project {project} has no breakpoint {wanted:?}");
    };
    session.dispatch(Command::PlayFrom(id))?;
    Ok(())
}

fn run_tui(mut app: App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Main loop
    let res = run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    let written = app.session.shutdown();
    log::info!("wrote {written} projects on exit");

    if let Err(err) = res {
        println!("{err:?}");
    }
    Ok(())
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<Stdout>>, app: &mut App) -> Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        let timeout = app
            .session
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
            .unwrap_or(IDLE_POLL)
            .min(IDLE_POLL);

        if event::poll(timeout)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
            && app.handle_key(key)? == Flow::Quit
        {
            return Ok(());
        }

        app.session.poll();
        if app.screen == Screen::Play
            && app.session.mode() == Mode::Idle(IdleState::ProjectSelected)
        {
            app.status = "Playback finished. q quits.".to_string();
        }
    }
}

fn command_label(kind: CommandKind) -> Option<&'static str> {
    match kind {
        CommandKind::Play => Some("Space: Play"),
        CommandKind::Pause => Some("Space: Pause"),
        CommandKind::StopPlaying => Some("q: Stop"),
        CommandKind::AddBreakpoint => Some("Ctrl-B: Breakpoint"),
        CommandKind::StopRecording => Some("Esc: Stop"),
        _ => None,
    }
}

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(f.area());

    let presentation = app.session.presentation();

    // Header: mode, project and progress
    let mode_color = match presentation.mode {
        Mode::Recording => Color::Red,
        Mode::Playing(PlayState::Playing) => Color::Green,
        Mode::Playing(PlayState::Paused) => Color::Yellow,
        Mode::Idle(_) => Color::Gray,
    };
    let mut header = vec![
        Span::styled(
            format!(" {} ", presentation.mode_label),
            Style::default()
                .bg(mode_color)
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(
            "  {}",
            presentation.project.as_deref().unwrap_or("no project")
        )),
    ];
    if let Some(progress) = &presentation.progress_label {
        header.push(Span::raw(format!("  breakpoint {progress}")));
    }
    f.render_widget(
        Paragraph::new(Line::from(header)).block(Block::default().borders(Borders::ALL)),
        chunks[0],
    );

    // Document
    let Some(editor) = app.session.editor() else {
        return;
    };
    let caret = editor.primary_selection().active;
    let height = chunks[1].height.saturating_sub(2) as usize;
    let scroll = caret.line.saturating_sub(height.saturating_sub(1));
    let lines: Vec<Line> = (0..editor.line_count())
        .map(|i| Line::from(editor.line(i).unwrap_or_default()))
        .collect();
    f.render_widget(
        Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("Document"))
            .scroll((u16::try_from(scroll).unwrap_or(u16::MAX), 0)),
        chunks[1],
    );
    f.set_cursor_position(caret_cell(chunks[1], caret, scroll));

    // Footer: prompt, or status and available commands
    let footer = match &app.prompt {
        Some(name) => Line::from(vec![
            Span::styled("Breakpoint name: ", Style::default().fg(Color::Yellow)),
            Span::raw(name.clone()),
        ]),
        None => {
            let commands: Vec<&str> = presentation
                .commands
                .iter()
                .filter_map(|kind| command_label(*kind))
                .collect();
            Line::from(vec![
                Span::raw(app.status.clone()),
                Span::raw("  "),
                Span::styled(commands.join(" | "), Style::default().fg(Color::DarkGray)),
            ])
        }
    };
    f.render_widget(
        Paragraph::new(footer).block(Block::default().borders(Borders::ALL)),
        chunks[2],
    );
}

/// Terminal cell of `caret` inside a bordered `area`, clamped to its inner
/// edge
fn caret_cell(area: Rect, caret: Position, scroll: usize) -> (u16, u16) {
    let column = u16::try_from(caret.character).unwrap_or(u16::MAX);
    let row = u16::try_from(caret.line.saturating_sub(scroll)).unwrap_or(u16::MAX);
    (
        area.x
            .saturating_add(1)
            .saturating_add(column)
            .min(area.right().saturating_sub(2)),
        area.y
            .saturating_add(1)
            .saturating_add(row)
            .min(area.bottom().saturating_sub(2)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use screencast_engine::{Change, EditOp, ManualClock, MemoryBackend, Selection};
    use tempfile::TempDir;

    fn session() -> Session<RopeDocument> {
        let clock = Rc::new(ManualClock::new());
        let store = ProjectStore::open(MemoryBackend::new(), StoreOptions::default(), clock.clone())
            .unwrap();
        Session::new(store, clock, SessionOptions::default())
    }

    fn record_hi(session: &mut Session<RopeDocument>) {
        session.store_mut().get("demo").borrow_mut().add_change(Change::new(
            vec![EditOp::insert(Position::new(0, 0), 0, "hi")],
            vec![Selection::caret(Position::new(0, 2))],
        ));
    }

    #[test]
    fn test_record_new_project_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("main.rs");
        fs::write(&path, "fn main() {}\n").unwrap();
        let mut session = session();

        prepare_recording(&mut session, "demo", Some(&path)).unwrap();

        assert_eq!(session.mode(), Mode::Recording);
        assert_eq!(session.editor().unwrap().text(), "fn main() {}\n");
        assert_eq!(
            session.project().unwrap().borrow().data().initial_content,
            "fn main() {}\n"
        );
    }

    #[test]
    fn test_record_with_history_continues_from_replay() {
        let mut session = session();
        record_hi(&mut session);

        prepare_recording(&mut session, "demo", None).unwrap();

        assert_eq!(session.editor().unwrap().text(), "hi");
    }

    #[test]
    fn test_record_with_history_refuses_a_file() {
        let mut session = session();
        record_hi(&mut session);

        let err = prepare_recording(&mut session, "demo", Some(Path::new("other.rs"))).unwrap_err();

        assert!(err.to_string().contains("already has recorded changes"));
        assert!(session.editor().is_none());
        assert_ne!(session.mode(), Mode::Recording);
    }

    #[test]
    fn test_delete_reports_unknown_projects() {
        let mut session = session();
        record_hi(&mut session);
        session.store_mut().flush_all();

        let (deleted, unknown) =
            delete_projects(&mut session, vec!["demo".into(), "ghost".into()]).unwrap();

        assert_eq!(deleted, vec!["demo".to_string()]);
        assert_eq!(unknown, vec!["ghost".to_string()]);
        assert!(!session.store().has("demo"));

        let (deleted, unknown) = delete_projects(&mut session, vec!["ghost".into()]).unwrap();
        assert!(deleted.is_empty());
        assert_eq!(unknown, vec!["ghost".to_string()]);
    }

    #[test]
    fn test_caret_cell_clamps_to_the_document_box() {
        let area = Rect::new(0, 3, 40, 10);

        assert_eq!(caret_cell(area, Position::new(0, 4), 0), (5, 4));
        assert_eq!(caret_cell(area, Position::new(12, 2), 5), (3, 11));
        assert_eq!(caret_cell(area, Position::new(0, 100_000), 0), (38, 4));
        assert_eq!(caret_cell(area, Position::new(100_000, 0), 0), (1, 11));
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args() {
        assert!(matches!(parse_args(&args(&["list"])), Some(Invocation::List)));
        assert!(matches!(
            parse_args(&args(&["record", "demo", "main.rs"])),
            Some(Invocation::Record { project, file: Some(_) }) if project == "demo"
        ));
        assert!(matches!(
            parse_args(&args(&["play", "demo", "2"])),
            Some(Invocation::Play { breakpoint: Some(b), .. }) if b == "2"
        ));
        assert!(matches!(
            parse_args(&args(&["delete", "a", "b"])),
            Some(Invocation::Delete { projects }) if projects.len() == 2
        ));
        assert!(parse_args(&args(&["delete"])).is_none());
        assert!(parse_args(&args(&[])).is_none());
        assert!(parse_args(&args(&["list", "extra"])).is_none());
    }
}
