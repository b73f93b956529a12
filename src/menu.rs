// Interactive menu
//
// Number keys pick an entry without Enter (crossterm raw mode); free-text
// answers such as file names are read line by line from stdin.

use crossterm::{
    cursor::MoveTo,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{Clear, ClearType, disable_raw_mode, enable_raw_mode},
};
use std::io::{self, BufRead, Write};
use std::path::Path;
use tracing::error;

use crate::app::{self, Result, Session};
use crate::pattern::Scale;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Measure,
    PlotLastRun,
    PlotFile,
    PlotTwoFiles,
    SingleMeasurement,
    SingleBackground,
    Quit,
}

impl MenuChoice {
    /// In display order; entry `n` is selected with key `n + 1`
    pub const ALL: [MenuChoice; 7] = [
        MenuChoice::Measure,
        MenuChoice::PlotLastRun,
        MenuChoice::PlotFile,
        MenuChoice::PlotTwoFiles,
        MenuChoice::SingleMeasurement,
        MenuChoice::SingleBackground,
        MenuChoice::Quit,
    ];

    pub fn label(self) -> &'static str {
        match self {
            MenuChoice::Measure => "Measure AUT w/ coherent AM method",
            MenuChoice::PlotLastRun => "Plot last run data",
            MenuChoice::PlotFile => "Plot data from file",
            MenuChoice::PlotTwoFiles => "Plot data from two files",
            MenuChoice::SingleMeasurement => "Capture single measurement",
            MenuChoice::SingleBackground => "Capture single background",
            MenuChoice::Quit => "Quit",
        }
    }

    pub fn key(self) -> char {
        let index = Self::ALL.iter().position(|&c| c == self).unwrap_or(0);
        char::from(b'1' + index as u8)
    }

    pub fn from_key(key: char) -> Option<Self> {
        let index = key.to_digit(10)?.checked_sub(1)? as usize;
        Self::ALL.get(index).copied()
    }
}

/// What the loop does after an entry has run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Source of free-text answers
pub trait Prompt {
    fn ask(&mut self, question: &str) -> io::Result<String>;
}

/// Prompts on stdout, answers from stdin
pub struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn ask(&mut self, question: &str) -> io::Result<String> {
        print!("{}", question);
        io::stdout().flush()?;
        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        Ok(answer.trim().to_string())
    }
}

fn ask_scale(prompt: &mut dyn Prompt) -> io::Result<Scale> {
    let answer = prompt.ask("Plot in dB? (y/n): ")?;
    Ok(if answer.eq_ignore_ascii_case("y") {
        Scale::Decibel
    } else {
        Scale::Linear
    })
}

/// Run one menu entry, asking for whatever it needs
pub fn run_choice(
    session: &mut Session,
    choice: MenuChoice,
    prompt: &mut dyn Prompt,
) -> Result<Flow> {
    match choice {
        MenuChoice::Measure => {
            let samples = session.measure()?;
            println!("Recorded {} positions", samples.len());
            for s in samples {
                println!(
                    "  mast {:>7.1}  arm {:>6.1}  rssi {:.3e}",
                    s.mast_angle, s.arm_angle, s.transmission_rssi
                );
            }
        }
        MenuChoice::PlotLastRun => {
            if session.last_run().is_none() {
                println!("Run a scan before plotting data");
                return Ok(Flow::Continue);
            }
            let title = prompt.ask("Enter a title for the graph: ")?;
            let scale = ask_scale(prompt)?;
            if let Some(text) = session.plot_last_run(&title, scale) {
                println!("{}", text);
            }
        }
        MenuChoice::PlotFile => {
            let file = prompt.ask("Enter the name of the data to plot: ")?;
            let scale = ask_scale(prompt)?;
            println!("{}", app::plot_file(Path::new(&file), scale)?);
        }
        MenuChoice::PlotTwoFiles => {
            let first = prompt.ask("Enter the name of the first file to plot: ")?;
            let second = prompt.ask("Enter the name of the second file to plot: ")?;
            let scale = ask_scale(prompt)?;
            println!(
                "{}",
                app::plot_files(Path::new(&first), Path::new(&second), scale)?
            );
        }
        MenuChoice::SingleMeasurement => {
            println!("Single measurement");
            println!("RMS = {:.3e}", session.single(true)?);
        }
        MenuChoice::SingleBackground => {
            println!("Single background measurement");
            println!("RMS = {:.3e}", session.single(false)?);
        }
        MenuChoice::Quit => return Ok(Flow::Quit),
    }
    Ok(Flow::Continue)
}

fn show_menu() -> io::Result<()> {
    let mut out = io::stdout();
    execute!(out, Clear(ClearType::All), MoveTo(0, 0))?;
    writeln!(out, "Please select from the following options:\n")?;
    for choice in MenuChoice::ALL {
        writeln!(out, "{}: {}", choice.key(), choice.label())?;
    }
    write!(out, "\nPlease enter selection: ")?;
    out.flush()
}

/// Block until a valid selection key is pressed
fn read_choice() -> io::Result<MenuChoice> {
    enable_raw_mode()?;
    let choice = wait_for_key();
    disable_raw_mode()?;

    let choice = choice?;
    println!("{}", choice.key());
    Ok(choice)
}

fn wait_for_key() -> io::Result<MenuChoice> {
    loop {
        if let Event::Key(KeyEvent {
            code,
            kind,
            modifiers,
            ..
        }) = event::read()?
        {
            if kind != KeyEventKind::Press {
                continue;
            }
            match code {
                // Raw mode swallows SIGINT
                KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                    return Ok(MenuChoice::Quit);
                }
                KeyCode::Char('q') | KeyCode::Esc => return Ok(MenuChoice::Quit),
                KeyCode::Char(key) => {
                    if let Some(choice) = MenuChoice::from_key(key) {
                        return Ok(choice);
                    }
                }
                _ => {}
            }
        }
    }
}

/// Menu loop; entry failures are reported and the menu is shown again
pub fn run(session: &mut Session) -> io::Result<()> {
    let mut prompt = StdinPrompt;
    loop {
        show_menu()?;
        let choice = read_choice()?;

        match run_choice(session, choice, &mut prompt) {
            Ok(Flow::Quit) => {
                println!("Exiting...");
                return Ok(());
            }
            Ok(Flow::Continue) => {
                prompt.ask("\nPress enter to return to the menu")?;
            }
            Err(e) => {
                error!("{} failed: {}", choice.label(), e);
                println!("Operation failed\n{}", e);
                prompt.ask("Press enter to continue")?;
            }
        }
    }
}
