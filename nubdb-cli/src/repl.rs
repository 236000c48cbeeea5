//! Interactive shell: read commands from stdin until EOF or QUIT.

use std::io::{self, BufRead, Write};

use crate::command::Dispatcher;

pub fn run(dispatcher: &Dispatcher) -> io::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let response = dispatcher.dispatch(&line);
        writeln!(stdout, "{}", response.render())?;
        stdout.flush()?;

        if response.is_goodbye() {
            break;
        }
    }
    Ok(())
}
