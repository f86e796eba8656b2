use std::process::ExitCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Success,
    Error,
}

/// Outcome of a command: exit status plus an optional message for the user.
#[derive(Debug)]
pub struct Exit {
    status: Status,
    message: Option<String>,
}

impl Exit {
    pub fn success() -> Self {
        Self {
            status: Status::Success,
            message: None,
        }
    }

    pub fn error() -> Self {
        Self {
            status: Status::Error,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Print the message, if any, and turn the outcome into a process exit code.
    /// Success messages go to stdout, error messages to stderr.
    pub fn report(self) -> ExitCode {
        match self.status {
            Status::Success => {
                if let Some(message) = self.message {
                    println!("{message}");
                }
                ExitCode::SUCCESS
            }
            Status::Error => {
                if let Some(message) = self.message {
                    eprintln!("{message}");
                }
                ExitCode::FAILURE
            }
        }
    }
}
