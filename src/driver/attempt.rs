//! Per-attempt launch parameters.

/// Everything that varies between attempts of one session.
///
/// A restart builds a new plan; nothing is mutated in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptPlan {
    /// 1-based attempt number.
    pub attempt: u32,
    /// Launch with every tool pre-authorized.
    pub auto_grant: bool,
    /// Conversation to resume.
    pub resume_id: Option<String>,
}

impl AttemptPlan {
    /// Plan for the first attempt.
    #[must_use]
    pub fn first(auto_grant: bool, resume_id: Option<String>) -> Self {
        Self {
            attempt: 1,
            auto_grant,
            resume_id,
        }
    }

    /// Plan for the attempt after a granted denial.
    #[must_use]
    pub fn restart(&self, resume_id: Option<String>) -> Self {
        Self {
            attempt: self.attempt + 1,
            auto_grant: true,
            resume_id: resume_id.or_else(|| self.resume_id.clone()),
        }
    }

    /// CLI arguments: configured extras, then the session flags.
    #[must_use]
    pub fn command_args(&self, extra: &[String], prompt: &str) -> Vec<String> {
        let mut args = extra.to_vec();
        args.extend(
            ["-p", prompt, "--output-format", "stream-json", "--verbose"]
                .into_iter()
                .map(str::to_owned),
        );
        if let Some(id) = &self.resume_id {
            args.push("--resume".to_owned());
            args.push(id.clone());
        }
        if self.auto_grant {
            args.push("--dangerously-skip-permissions".to_owned());
        }
        args
    }
}
