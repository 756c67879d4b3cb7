//! Result types produced by the pipeline, the remote tool and the agent.

use serde::{Deserialize, Serialize};

use faultline_knowledge::RetrievedCase;

/// Outcome of a synchronous diagnosis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisResult {
    pub diagnosis: String,
    pub root_cause: String,
    pub solution: String,
    /// Always within `[0, 1]`.
    pub confidence: f64,
    /// Cases used as evidence, best first.
    pub retrieved_cases: Vec<RetrievedCase>,
}

impl DiagnosisResult {
    /// Derived from the best retrieved case when the model gave nothing usable.
    pub(crate) fn from_top_case(cases: Vec<RetrievedCase>) -> Self {
        match cases.first() {
            Some(top) => Self {
                diagnosis: format!("基于历史案例的诊断：{}", top.case.error_type),
                root_cause: top.case.root_cause.clone(),
                solution: top.case.solution.clone(),
                confidence: top.score().clamp(0.0, 1.0),
                retrieved_cases: cases,
            },
            None => Self::undiagnosable(),
        }
    }

    /// The fixed answer when there is no evidence at all.
    pub fn undiagnosable() -> Self {
        Self {
            diagnosis: "无法自动诊断".to_string(),
            root_cause: "未找到相似案例，建议人工排查".to_string(),
            solution: "请提供更多日志信息或联系运维团队".to_string(),
            confidence: 0.0,
            retrieved_cases: Vec::new(),
        }
    }
}

/// Outcome of one remote command.
///
/// `exit_code == -1` means the command never ran to completion on the host
/// (connection failure, timeout, or policy rejection).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub command: String,
}

impl CommandResult {
    pub fn completed(
        command: impl Into<String>,
        exit_code: i32,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self {
            success: exit_code == 0,
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
            command: command.into(),
        }
    }

    pub fn connection_failed(command: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::not_run(command, format!("SSH 连接或执行失败: {reason}"))
    }

    pub fn rejected(command: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::not_run(command, format!("命令被安全策略拒绝: {reason}"))
    }

    fn not_run(command: impl Into<String>, stderr: String) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr,
            exit_code: -1,
            command: command.into(),
        }
    }

    /// The text fed back to the model for this result.
    pub fn tool_output(&self) -> String {
        if self.success {
            let out = self.stdout.trim();
            if out.is_empty() {
                "✓ 命令执行成功（无输出）".to_string()
            } else {
                format!("✓ 命令执行成功:\n{out}")
            }
        } else {
            format!(
                "✗ 命令执行失败 (退出码: {}):\n{}",
                self.exit_code,
                self.stderr.trim()
            )
        }
    }
}

/// Outcome of a tool-calling diagnosis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDiagnosis {
    pub diagnosis: String,
    pub root_cause: String,
    pub solution: String,
    pub confidence: f64,
    /// Commands issued on the remote host, in order.
    pub tool_calls: Vec<String>,
}

impl AgentDiagnosis {
    pub fn failed(error: impl std::fmt::Display) -> Self {
        Self {
            diagnosis: "Agent 诊断失败".to_string(),
            root_cause: error.to_string(),
            solution: "请使用传统 RAG 方式诊断".to_string(),
            confidence: 0.0,
            tool_calls: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_knowledge::IncidentCase;

    #[test]
    fn test_tool_output_variants() {
        let ok = CommandResult::completed("uptime", 0, " up 3 days\n", "");
        assert_eq!(ok.tool_output(), "✓ 命令执行成功:\nup 3 days");

        let empty = CommandResult::completed("true", 0, "", "");
        assert_eq!(empty.tool_output(), "✓ 命令执行成功（无输出）");

        let failed = CommandResult::completed("systemctl status mysql", 3, "", "inactive\n");
        assert!(!failed.success);
        assert_eq!(failed.tool_output(), "✗ 命令执行失败 (退出码: 3):\ninactive");
    }

    #[test]
    fn test_not_run_results() {
        let r = CommandResult::connection_failed("ls", "timed out");
        assert_eq!(r.exit_code, -1);
        assert!(!r.success);
        assert_eq!(r.stderr, "SSH 连接或执行失败: timed out");

        let r = CommandResult::rejected("reboot", "blocked pattern 'reboot'");
        assert!(r.stderr.starts_with("命令被安全策略拒绝"));
    }

    #[test]
    fn test_fallback_prefers_rerank_score() {
        let mut case = RetrievedCase::new(IncidentCase::new("Redis OOM", "", "maxmemory", "raise it"), 0.4);
        case.rerank_score = Some(0.92);
        let result = DiagnosisResult::from_top_case(vec![case]);
        assert_eq!(result.diagnosis, "基于历史案例的诊断：Redis OOM");
        assert_eq!(result.confidence, 0.92);
        assert_eq!(result.retrieved_cases.len(), 1);
    }

    #[test]
    fn test_fallback_without_cases() {
        let result = DiagnosisResult::from_top_case(Vec::new());
        assert_eq!(result, DiagnosisResult::undiagnosable());
        assert_eq!(result.confidence, 0.0);
    }
}
