//! Human-in-the-loop prompts
//!
//! The crawler blocks on the operator when it cannot proceed on its own:
//! after a verification challenge, or on a page that is neither content nor
//! a clear end of results.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

/// What the crawler needs from the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorRequest<'a> {
    /// The site demands verification; fresh session cookies are needed
    Credentials {
        url: &'a str,
        target: &'a str,
        page: u32,
    },

    /// The page is empty without an explicit end signal
    AmbiguousPage {
        url: &'a str,
        target: &'a str,
        page: u32,
    },
}

impl OperatorRequest<'_> {
    pub fn url(&self) -> &str {
        match self {
            Self::Credentials { url, .. } | Self::AmbiguousPage { url, .. } => url,
        }
    }
}

/// Source of operator answers
///
/// `None` means no answer can ever come (closed input) and is treated like a
/// blank line.
pub trait Operator {
    fn prompt(&mut self, request: &OperatorRequest<'_>) -> Option<String>;
}

/// Interactive operator on the controlling terminal
///
/// Instructions go to stderr so they never mix with piped stdout.
#[derive(Debug, Default)]
pub struct ConsoleOperator;

impl ConsoleOperator {
    pub fn new() -> Self {
        Self
    }
}

impl Operator for ConsoleOperator {
    fn prompt(&mut self, request: &OperatorRequest<'_>) -> Option<String> {
        match request {
            OperatorRequest::Credentials { url, target, page } => {
                eprintln!();
                eprintln!("Verification required for {} page {}", target, page);
                eprintln!("  1. Open {} in a browser and complete the verification", url);
                eprintln!("  2. Copy the Cookie request header from the browser dev tools");
                eprintln!("  3. Paste it below (empty line stops the crawl)");
                eprint!("cookie> ");
            }
            OperatorRequest::AmbiguousPage { url, target, page } => {
                eprintln!();
                eprintln!("No results and no end marker on {} page {}", target, page);
                eprintln!("  Check {} in a browser, then:", url);
                eprintln!("    - type END if the results are exhausted");
                eprintln!("    - paste fresh cookies to retry the page");
                eprintln!("    - press enter to stop the crawl");
                eprint!("answer> ");
            }
        }
        let _ = io::stderr().flush();

        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line.trim().to_string()),
            Err(e) => {
                tracing::error!("Failed to read operator input: {}", e);
                None
            }
        }
    }
}

/// Operator replaying a fixed list of answers
///
/// Once the answers run out every prompt gets `None`, which stops the crawl.
#[derive(Debug, Default)]
pub struct ScriptedOperator {
    answers: VecDeque<String>,
    prompts: usize,
}

impl ScriptedOperator {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            prompts: 0,
        }
    }

    /// Number of prompts answered so far
    pub fn prompts(&self) -> usize {
        self.prompts
    }
}

impl Operator for ScriptedOperator {
    fn prompt(&mut self, request: &OperatorRequest<'_>) -> Option<String> {
        self.prompts += 1;
        let answer = self.answers.pop_front();
        tracing::debug!("Scripted answer for {}: {:?}", request.url(), answer.is_some());
        answer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_answers_in_order() {
        let mut operator = ScriptedOperator::new(["sid=1", "END"]);
        let request = OperatorRequest::AmbiguousPage {
            url: "https://example.com/",
            target: "a025-b01",
            page: 3,
        };

        assert_eq!(operator.prompt(&request).as_deref(), Some("sid=1"));
        assert_eq!(operator.prompt(&request).as_deref(), Some("END"));
        assert_eq!(operator.prompt(&request), None);
        assert_eq!(operator.prompts(), 3);
    }

    #[test]
    fn test_request_url() {
        let request = OperatorRequest::Credentials {
            url: "https://example.com/x",
            target: "a025-b01",
            page: 1,
        };
        assert_eq!(request.url(), "https://example.com/x");
    }
}
