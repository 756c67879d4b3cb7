//! Prompt text for the pipeline and the agent.

use faultline_knowledge::RetrievedCase;

pub const DIAGNOSIS_SYSTEM_PROMPT: &str =
    "你是一位资深的 AIOps 运维专家，擅长分析系统故障并提供解决方案。";

pub const AGENT_SYSTEM_PROMPT: &str = r#"你是一位资深的 AIOps 运维专家，精通 Linux 系统管理和故障诊断。

你有一个强大的工具：execute_ssh_command
- 可以在远程服务器上执行 Shell 命令
- **你需要自己根据错误类型生成合适的诊断命令**

诊断流程：
1. 分析错误日志，提取关键信息：
   - IP 地址
   - 端口号
   - 服务名称（MySQL、Redis、Nginx、Kafka 等）
   - 错误类型

2. 根据服务类型，自己生成诊断命令，例如：
   - MySQL: systemctl status mysql 或 systemctl status mysqld
   - Redis: systemctl status redis
   - PostgreSQL: systemctl status postgresql
   - Nginx: systemctl status nginx
   - Kafka: systemctl status kafka
   - Docker: docker ps, docker logs <container>
   - 端口检查: ss -tuln | grep <port> 或 netstat -tuln | grep <port>
   - 进程检查: ps aux | grep <service>
   - 日志查看: tail -100 /var/log/<service>/*.log

3. 执行命令获取实际状态

4. 基于返回结果，给出：
   - 诊断结论
   - 根本原因
   - 详细的解决方案

注意：
- 命令要具体，不要泛泛而谈
- 只执行只读的诊断命令，不要修改系统状态
- 如果第一个命令失败，尝试其他常见的变体
- 综合多个命令的结果进行判断
- 最终输出必须包含：diagnosis, root_cause, solution"#;

/// Evidence block listing retrieved cases for the model.
pub fn format_evidence(cases: &[RetrievedCase]) -> String {
    if cases.is_empty() {
        return "无相似历史案例".to_string();
    }

    let mut text = String::new();
    for (i, case) in cases.iter().enumerate() {
        text.push_str(&format!(
            "\n案例{}（相似度: {:.2}）:\n  错误类型: {}\n  根本原因: {}\n  解决方案: {}\n",
            i + 1,
            case.similarity,
            case.case.error_type,
            case.case.root_cause,
            case.case.solution
        ));
    }
    text
}

pub fn diagnosis_prompt(error_text: &str, evidence: &str) -> String {
    format!(
        r#"请分析以下故障并以JSON格式输出诊断结果。

【当前故障】
{error_text}

【历史相似案例】
{evidence}

【输出要求】
请严格按照以下JSON格式输出（不要有其他文字）：
{{
  "diagnosis": "故障诊断（一句话概括）",
  "root_cause": "根本原因分析（深入技术细节）",
  "solution": "解决方案（分步骤，可执行）",
  "confidence": 0.85
}}"#
    )
}

pub fn agent_prompt(error_text: &str) -> String {
    format!(
        r#"分析以下故障日志并进行诊断：

{error_text}

请：
1. 提取关键信息（IP、端口、服务）
2. 如果可以，使用工具进行实际检查
3. 给出诊断、根本原因和解决方案

完成检查后，请只输出如下 JSON：
{{"diagnosis": "...", "root_cause": "...", "solution": "...", "confidence": 0.9}}"#
    )
}

pub fn tool_description(target: &str) -> String {
    format!(
        r#"在服务器 {target} 上执行 Shell 命令。

使用场景：
- 检查服务状态：systemctl status <service>
- 查看端口监听：ss -tuln | grep <port>
- 查看进程：ps aux | grep <process>
- 查看日志：tail -50 /var/log/<service>/*.log
- 检查磁盘：df -h
- 检查内存：free -h

输入：直接输入要执行的 Shell 命令（不需要 IP，默认连接到 {target}）
示例：systemctl status mysql"#
    )
}
