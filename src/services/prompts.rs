//! Centralized prompts, factor directives and tool definitions.
//!
//! This module is the single source of truth for the persona text, the
//! factor-conditioned system instruction, the repository tool declarations
//! and the structured-response schemas. Edit this file to customize model
//! behavior.

use chrono::{DateTime, FixedOffset};
use serde_json::{Value as JsonValue, json};

use crate::plugins::storage::{Factor, FactorValue};

// ============================================================================
// PERSONA
// ============================================================================

/// Fixed persona preamble shared by every generation request.
pub const PERSONA: &str = "Você é a Tessy, uma assistente de conversação prestativa e precisa. \
Responda sempre de forma clara e bem estruturada, no idioma da mensagem do usuário.";

/// Preamble of the interpretation request.
pub const INTERPRETER_PREAMBLE: &str = "Analise a mensagem do usuário e extraia a intenção \
em JSON estruturado: a tarefa pedida (task), o assunto (subject) e, quando houver, \
detalhes adicionais (details) e o idioma desejado (language).";

// ============================================================================
// SYSTEM INSTRUCTION
// ============================================================================

/// Timezone of the instruction timestamp (America/Sao_Paulo, UTC-3).
pub fn local_offset() -> FixedOffset {
    FixedOffset::west_opt(3 * 3600).unwrap_or_else(|| FixedOffset::east_opt(0).unwrap())
}

/// Build the factor-conditioned system instruction.
///
/// Clauses are appended in a fixed order: persona, timestamp, then one
/// clause per enabled factor that calls for one. Slider value 3 and the
/// intermediate/advanced audiences are the implicit baseline and add
/// nothing. The web-search directive is emitted only when no repository is
/// bound, mirroring the tool-selection exclusivity.
pub fn build_system_instruction(
    factors: &[Factor],
    now_local: DateTime<FixedOffset>,
    repo_configured: bool,
) -> String {
    let mut out = String::from(PERSONA);
    out.push_str(&format!(
        "\nData e hora atuais: {}.",
        now_local.format("%d/%m/%Y %H:%M")
    ));

    for factor in factors.iter().filter(|f| f.enabled) {
        match (&factor.id[..], &factor.value) {
            ("tone", FactorValue::Dropdown { value, .. }) => match value.as_str() {
                "professional" => out.push_str(
                    "\nUse um tom profissional e objetivo, adequado a um ambiente de trabalho.",
                ),
                "friendly" => out.push_str(
                    "\nUse um tom amigável e acolhedor, como numa conversa entre colegas.",
                ),
                _ => {}
            },
            ("detail_level", FactorValue::Slider { value, .. }) => match value {
                1 => out.push_str(
                    "\nSeja extremamente conciso: responda no menor número possível de frases.",
                ),
                2 => out.push_str("\nSeja breve, cobrindo apenas os pontos essenciais."),
                // 3 is the implicit baseline.
                4 => out.push_str(
                    "\nResponda com detalhes, incluindo exemplos quando forem úteis.",
                ),
                5 => out.push_str(
                    "\nFaça uma análise profunda e abrangente, organizada em múltiplas seções.",
                ),
                _ => {}
            },
            ("audience", FactorValue::Dropdown { value, .. }) => match value.as_str() {
                "beginner" => out.push_str(
                    "\nUse linguagem simples e evite jargões: o leitor é iniciante no assunto.",
                ),
                "expert" => out.push_str(
                    "\nUse terminologia técnica avançada: o leitor é especialista no assunto.",
                ),
                // intermediate/advanced are the baseline vocabulary.
                _ => {}
            },
            ("code_blocks", FactorValue::Toggle) => {
                out.push_str(
                    "\nQuando incluir código, use blocos de código formatados e comentados.",
                );
            }
            ("extra_context", FactorValue::Text { value }) => {
                let trimmed = value.trim();
                if !trimmed.is_empty() {
                    out.push_str(&format!("\nContexto adicional do usuário: {trimmed}"));
                }
            }
            ("web_search", FactorValue::Toggle) => {
                if !repo_configured {
                    out.push_str(
                        "\nUse a pesquisa na web para fundamentar a resposta com informações atuais.",
                    );
                }
            }
            ("response_language", FactorValue::Dropdown { value, .. }) => {
                if value != "auto" {
                    out.push_str(&format!("\nResponda em {value}."));
                }
            }
            // Unknown ids and mismatched shapes are ignored.
            _ => {}
        }
    }

    if repo_configured {
        out.push_str(
            "\nUm repositório GitHub está associado a este projeto. Use as ferramentas \
disponíveis para consultar commits, arquivos e estrutura quando a pergunta envolver o repositório.",
        );
    }

    out
}

// ============================================================================
// REPOSITORY TOOL DECLARATIONS
// ============================================================================

/// Function declarations for the repository tools, in the model wire format.
pub fn repository_tool_declarations() -> JsonValue {
    json!([
        {
            "name": "get_repository_info",
            "description": "Obtém os metadados do repositório associado (nome, descrição, linguagem, estrelas).",
            "parameters": { "type": "object", "properties": {} }
        },
        {
            "name": "get_recent_commits",
            "description": "Lista os commits mais recentes do repositório.",
            "parameters": {
                "type": "object",
                "properties": {
                    "limit": { "type": "integer", "description": "Quantidade de commits (padrão 10)." }
                }
            }
        },
        {
            "name": "create_issue",
            "description": "Cria uma issue no repositório com título e corpo.",
            "parameters": {
                "type": "object",
                "properties": {
                    "title": { "type": "string", "description": "Título da issue." },
                    "body": { "type": "string", "description": "Corpo da issue em Markdown." }
                },
                "required": ["title"]
            }
        },
        {
            "name": "get_file_content",
            "description": "Lê o conteúdo de um arquivo do repositório.",
            "parameters": {
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Caminho do arquivo a partir da raiz." }
                },
                "required": ["path"]
            }
        },
        {
            "name": "list_directory",
            "description": "Lista os itens de um diretório do repositório.",
            "parameters": {
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Caminho do diretório (vazio para a raiz)." }
                }
            }
        },
        {
            "name": "search_code",
            "description": "Busca um termo no código do repositório.",
            "parameters": {
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Termo de busca." }
                },
                "required": ["query"]
            }
        },
        {
            "name": "get_readme",
            "description": "Lê o README do repositório.",
            "parameters": { "type": "object", "properties": {} }
        },
        {
            "name": "list_branches",
            "description": "Lista os branches do repositório.",
            "parameters": { "type": "object", "properties": {} }
        },
        {
            "name": "get_commit_details",
            "description": "Obtém os detalhes de um commit específico (estatísticas e arquivos alterados).",
            "parameters": {
                "type": "object",
                "properties": {
                    "sha": { "type": "string", "description": "SHA do commit." }
                },
                "required": ["sha"]
            }
        },
        {
            "name": "get_repository_tree",
            "description": "Obtém a árvore de arquivos do repositório até uma profundidade.",
            "parameters": {
                "type": "object",
                "properties": {
                    "depth": { "type": "integer", "description": "Profundidade máxima (padrão 2)." }
                }
            }
        }
    ])
}

// ============================================================================
// STRUCTURED RESPONSE SCHEMAS
// ============================================================================

/// Response schema for the intent interpretation call.
pub fn intent_response_schema() -> JsonValue {
    json!({
        "type": "object",
        "properties": {
            "task": { "type": "string", "description": "A tarefa pedida, em snake_case (ex.: criar_resumo)." },
            "subject": { "type": "string", "description": "O assunto principal da mensagem." },
            "details": { "type": "string", "description": "Detalhes relevantes, se houver." },
            "language": { "type": "string", "description": "Idioma pedido para a resposta, se houver." }
        },
        "required": ["task", "subject"]
    })
}

/// Response schema for the prompt optimization call.
pub fn optimization_response_schema() -> JsonValue {
    json!({
        "type": "object",
        "properties": {
            "clarityScore": { "type": "number", "description": "Clareza do prompt, de 0 a 10." },
            "completenessScore": { "type": "number", "description": "Completude do prompt, de 0 a 10." },
            "suggestions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "category": { "type": "string" },
                        "issue": { "type": "string" },
                        "recommendation": { "type": "string" }
                    },
                    "required": ["category", "issue", "recommendation"]
                }
            },
            "optimizedPrompt": { "type": "string", "description": "Versão reescrita e melhorada do prompt." }
        },
        "required": ["clarityScore", "completenessScore", "suggestions", "optimizedPrompt"]
    })
}
