//! Structured quote extraction: one model call, heuristic fallback.
//!
//! The model client comes from a [`ClientProvider`], so missing credentials
//! simply route every message to the regex fallback.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::error::{ExtractionError, LlmError};
use crate::llm::{ChatMessage, ClientProvider, CompletionRequest};
use crate::pipeline::fallback;
use crate::pipeline::types::{AttachmentText, ExtractionResult};
use crate::quotes::{GoldenExample, PriceItem, Provenance};
use crate::store::Database;

/// Confidence assumed when the model omits it.
const DEFAULT_MODEL_CONFIDENCE: u8 = 50;

/// Appended when the text blob is cut at the ceiling.
const TRUNCATION_MARKER: &str = "\n... (texto truncado)";

/// Characters of a golden example's input embedded in the prompt.
const GOLDEN_INPUT_PREVIEW: usize = 1500;

/// Characters of raw model output kept on parse errors.
const RAW_PREVIEW: usize = 500;

/// What the extractor reads from one message.
#[derive(Debug, Clone, Default)]
pub struct ExtractionInput {
    pub subject: String,
    pub body: String,
    pub attachments: Vec<AttachmentText>,
    pub vendor_name: Option<String>,
    pub category: Option<String>,
}

impl ExtractionInput {
    fn is_blank(&self) -> bool {
        self.subject.trim().is_empty()
            && self.body.trim().is_empty()
            && self.attachments.iter().all(|a| a.text.trim().is_empty())
    }
}

/// Turns vendor replies into [`ExtractionResult`]s.
pub struct Extractor {
    client: Arc<dyn ClientProvider>,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
    max_text_chars: usize,
    golden_examples: usize,
}

impl Extractor {
    pub fn new(client: Arc<dyn ClientProvider>, config: &PipelineConfig) -> Self {
        Self {
            client,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: config.model_timeout,
            max_text_chars: config.max_text_chars,
            golden_examples: config.golden_examples,
        }
    }

    /// Extract price and terms from a reply.
    ///
    /// Returns `None` only when there is no text at all. Any model problem
    /// (no client, call failure, timeout, unparseable output) falls back to
    /// the heuristic extractor.
    pub async fn analyze(&self, input: &ExtractionInput, store: &dyn Database) -> Option<ExtractionResult> {
        if input.is_blank() {
            debug!("Nothing to extract from");
            return None;
        }

        let text = build_text_blob(input, self.max_text_chars);
        let result = match self.model_extract(input, &text, store).await {
            Ok(result) => result,
            Err(ExtractionError::ClientUnavailable) => {
                info!("No model client configured, using heuristic extraction");
                fallback::extract(&text)
            }
            Err(ExtractionError::Model(e)) => {
                warn!(error = %e, "Model call failed, using heuristic extraction");
                fallback::extract(&text)
            }
            Err(ExtractionError::EmptyResponse) => {
                warn!("Model returned no content, using heuristic extraction");
                fallback::extract(&text)
            }
            Err(ExtractionError::Parse { reason, raw_preview }) => {
                warn!(%reason, raw = %raw_preview, "Model output was not valid JSON, using heuristic extraction");
                fallback::extract(&text)
            }
        };

        info!(
            provenance = result.provenance.label(),
            confidence = result.confidence,
            total_price = ?result.total_price,
            chars = text.chars().count(),
            "Quote extracted"
        );
        Some(result)
    }

    async fn model_extract(
        &self,
        input: &ExtractionInput,
        text: &str,
        store: &dyn Database,
    ) -> Result<ExtractionResult, ExtractionError> {
        let client = self.client.client().await.ok_or(ExtractionError::ClientUnavailable)?;
        let examples = self.load_examples(input.category.as_deref(), store).await;

        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_system_prompt()),
            ChatMessage::user(build_user_prompt(input, text, &examples)),
        ])
        .with_temperature(self.temperature)
        .with_max_tokens(self.max_tokens)
        .with_json_output();

        let response = tokio::time::timeout(self.timeout, client.complete(request))
            .await
            .map_err(|_| LlmError::Timeout {
                provider: client.model_name().to_string(),
                timeout: self.timeout,
            })??;

        if response.content.trim().is_empty() {
            return Err(ExtractionError::EmptyResponse);
        }
        parse_model_output(&response.content, client.model_name())
    }

    async fn load_examples(&self, category: Option<&str>, store: &dyn Database) -> Vec<GoldenExample> {
        let Some(category) = category.filter(|c| !c.trim().is_empty()) else {
            return Vec::new();
        };
        if self.golden_examples == 0 {
            return Vec::new();
        }
        match store.golden_examples(category, self.golden_examples).await {
            Ok(examples) => {
                debug!(category, count = examples.len(), "Loaded golden examples");
                examples
            }
            Err(e) => {
                warn!(category, error = %e, "Golden example lookup failed");
                Vec::new()
            }
        }
    }
}

// ── Prompt construction ─────────────────────────────────────────────

/// Subject, body and attachment text, cut at `max_chars` characters.
pub fn build_text_blob(input: &ExtractionInput, max_chars: usize) -> String {
    let mut text = format!("Asunto: {}\n\nCuerpo del email:\n{}", input.subject, input.body);

    let readable: Vec<&AttachmentText> = input.attachments.iter().filter(|a| !a.text.trim().is_empty()).collect();
    if !readable.is_empty() {
        text.push_str("\n\n--- DOCUMENTOS ADJUNTOS ---\n");
        for attachment in readable {
            let name = if attachment.filename.is_empty() {
                "Adjunto"
            } else {
                attachment.filename.as_str()
            };
            text.push_str(&format!("\n[{name}]:\n{}\n", attachment.text));
        }
    }

    if text.chars().count() > max_chars {
        let mut cut: String = text.chars().take(max_chars).collect();
        cut.push_str(TRUNCATION_MARKER);
        return cut;
    }
    text
}

fn build_system_prompt() -> String {
    "Eres un asistente experto en analizar presupuestos de servicios para bodas.\n\
     Extrae información estructurada de emails y documentos adjuntos en los que proveedores envían sus presupuestos.\n\n\
     Responde ÚNICAMENTE con un objeto JSON válido con esta estructura:\n\
     {\n\
       \"totalPrice\": número o null,\n\
       \"priceBreakdown\": [{\"concept\": \"...\", \"amount\": número}],\n\
       \"servicesIncluded\": [\"...\"],\n\
       \"extras\": [\"...\"],\n\
       \"paymentTerms\": \"...\" o null,\n\
       \"deliveryTime\": \"...\" o null,\n\
       \"cancellationPolicy\": \"...\" o null,\n\
       \"warranty\": \"...\" o null,\n\
       \"additionalNotes\": \"...\" o null,\n\
       \"confidence\": número 0-100\n\
     }\n\n\
     Reglas:\n\
     - Precios como números, sin símbolos ni separadores de miles\n\
     - Si un campo no aparece, devuélvelo como null o lista vacía\n\
     - confidence refleja tu seguridad en la extracción"
        .to_string()
}

fn build_user_prompt(input: &ExtractionInput, text: &str, examples: &[GoldenExample]) -> String {
    let mut prompt = String::with_capacity(text.len() + 512);

    if let Some(vendor) = input.vendor_name.as_deref().filter(|v| !v.is_empty()) {
        prompt.push_str(&format!("Proveedor: {vendor}\n"));
    }
    if let Some(category) = input.category.as_deref().filter(|c| !c.is_empty()) {
        prompt.push_str(&format!("Categoría: {category}\n"));
    }

    if !examples.is_empty() {
        prompt.push_str("\nEjemplos validados:\n");
        for (i, example) in examples.iter().enumerate() {
            let preview: String = example.input_text.chars().take(GOLDEN_INPUT_PREVIEW).collect();
            prompt.push_str(&format!(
                "\n[Ejemplo {}]\nTexto:\n{}\nJSON:\n{}\n",
                i + 1,
                preview,
                example.expected
            ));
        }
    }

    prompt.push('\n');
    prompt.push_str(text);
    prompt.push_str("\n\nExtrae la información del presupuesto en formato JSON.");
    prompt
}

// ── Response parsing ────────────────────────────────────────────────

/// Lenient view of the model's JSON.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ModelQuote {
    total_price: Option<Value>,
    #[serde(deserialize_with = "null_as_default")]
    price_breakdown: Vec<ModelPriceItem>,
    #[serde(deserialize_with = "null_as_default")]
    services_included: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    extras: Vec<String>,
    payment_terms: Option<String>,
    delivery_time: Option<String>,
    cancellation_policy: Option<String>,
    warranty: Option<String>,
    #[serde(alias = "notes")]
    additional_notes: Option<String>,
    confidence: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ModelPriceItem {
    #[serde(default, alias = "description", alias = "item")]
    concept: Option<String>,
    #[serde(default)]
    amount: Option<Value>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parse model output into a result tagged with `model`.
fn parse_model_output(raw: &str, model: &str) -> Result<ExtractionResult, ExtractionError> {
    let json = extract_json_object(raw);
    let quote: ModelQuote = serde_json::from_str(json).map_err(|e| ExtractionError::Parse {
        reason: e.to_string(),
        raw_preview: raw.chars().take(RAW_PREVIEW).collect(),
    })?;

    let price_breakdown = quote
        .price_breakdown
        .into_iter()
        .filter_map(|item| {
            Some(PriceItem {
                concept: item.concept.filter(|c| !c.trim().is_empty())?,
                amount: item.amount.as_ref().and_then(value_to_decimal)?,
            })
        })
        .collect();

    Ok(ExtractionResult {
        total_price: quote.total_price.as_ref().and_then(value_to_decimal),
        price_breakdown,
        services_included: quote.services_included,
        extras: quote.extras,
        payment_terms: quote.payment_terms,
        delivery_time: quote.delivery_time,
        cancellation_policy: quote.cancellation_policy,
        warranty: quote.warranty,
        additional_notes: quote.additional_notes,
        confidence: quote
            .confidence
            .as_ref()
            .and_then(value_to_confidence)
            .unwrap_or(DEFAULT_MODEL_CONFIDENCE),
        provenance: Provenance::Model(model.to_string()),
        analyzed_at: Utc::now(),
    })
}

fn value_to_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(Decimal::from)
            .or_else(|| n.as_f64().and_then(Decimal::from_f64)),
        Value::String(s) => fallback::parse_amount(s),
        _ => None,
    }
}

fn value_to_confidence(value: &Value) -> Option<u8> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok()?,
        _ => return None,
    };
    Some(raw.round().clamp(0.0, 100.0) as u8)
}

/// The JSON object inside model output: bare, fenced, or surrounded by prose.
fn extract_json_object(text: &str) -> &str {
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        return trimmed;
    }
    let unfenced = strip_code_fence(trimmed);
    match (unfenced.find('{'), unfenced.rfind('}')) {
        (Some(open), Some(close)) if close > open => &unfenced[open..=close],
        _ => unfenced,
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(open) = text.find("```") else {
        return text;
    };
    let inner = &text[open + 3..];
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    match inner.find("```") {
        Some(close) => inner[..close].trim(),
        None => inner.trim(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::llm::{CompletionResponse, FinishReason, FixedClient, LlmProvider, ResponseFormat};
    use crate::store::InMemoryStore;

    struct MockLlm {
        reply: Result<String, fn() -> LlmError>,
        delay: Option<Duration>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl MockLlm {
        fn replying(content: &str) -> Self {
            Self {
                reply: Ok(content.to_string()),
                delay: None,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing(err: fn() -> LlmError) -> Self {
            Self {
                reply: Err(err),
                delay: None,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for MockLlm {
        fn model_name(&self) -> &str {
            "mock-model"
        }

        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            self.seen.lock().unwrap().push(request);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match &self.reply {
                Ok(content) => Ok(CompletionResponse {
                    content: content.clone(),
                    input_tokens: 100,
                    output_tokens: 50,
                    finish_reason: FinishReason::Stop,
                    response_id: None,
                }),
                Err(make) => Err(make()),
            }
        }
    }

    fn extractor(provider: Option<Arc<MockLlm>>, config: &PipelineConfig) -> Extractor {
        let client = match provider {
            Some(p) => FixedClient::new(p),
            None => FixedClient::none(),
        };
        Extractor::new(Arc::new(client), config)
    }

    fn input(subject: &str, body: &str) -> ExtractionInput {
        ExtractionInput {
            subject: subject.into(),
            body: body.into(),
            category: Some("Fotografía".into()),
            vendor_name: Some("Foto Perfecta".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn no_credentials_uses_heuristic() {
        let store = InMemoryStore::new();
        let result = extractor(None, &PipelineConfig::default())
            .analyze(&input("Re: boda", "El presupuesto es 2500€"), &store)
            .await
            .unwrap();
        assert_eq!(result.total_price, Some(dec!(2500)));
        assert_eq!(result.confidence, 70);
        assert_eq!(result.provenance, Provenance::Heuristic);
    }

    #[tokio::test]
    async fn no_credentials_no_price() {
        let store = InMemoryStore::new();
        let result = extractor(None, &PipelineConfig::default())
            .analyze(&input("Re: boda", "Os llamamos mañana"), &store)
            .await
            .unwrap();
        assert_eq!(result.total_price, None);
        assert_eq!(result.confidence, 30);
    }

    #[tokio::test]
    async fn blank_input_yields_none() {
        let store = InMemoryStore::new();
        assert!(
            extractor(None, &PipelineConfig::default())
                .analyze(&input(" ", ""), &store)
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn model_output_is_parsed() {
        let llm = Arc::new(MockLlm::replying(
            "```json\n{\"totalPrice\": 2500, \"priceBreakdown\": [{\"concept\": \"Reportaje\", \"amount\": \"2.000\"}, {\"concept\": \"Álbum\", \"amount\": 500}], \"servicesIncluded\": [\"8 horas\"], \"extras\": null, \"paymentTerms\": \"30% anticipo\", \"confidence\": 92}\n```",
        ));
        let store = InMemoryStore::new();
        let result = extractor(Some(Arc::clone(&llm)), &PipelineConfig::default())
            .analyze(&input("Re: Presupuesto", "Adjunto presupuesto"), &store)
            .await
            .unwrap();

        assert_eq!(result.total_price, Some(dec!(2500)));
        assert_eq!(result.price_breakdown.len(), 2);
        assert_eq!(result.price_breakdown[0].amount, dec!(2000));
        assert_eq!(result.services_included, vec!["8 horas".to_string()]);
        assert!(result.extras.is_empty());
        assert_eq!(result.payment_terms.as_deref(), Some("30% anticipo"));
        assert_eq!(result.confidence, 92);
        assert_eq!(result.provenance, Provenance::Model("mock-model".into()));

        let seen = llm.seen.lock().unwrap();
        let request = &seen[0];
        assert_eq!(request.response_format, ResponseFormat::JsonObject);
        assert_eq!(request.temperature, Some(0.1));
        assert_eq!(request.max_tokens, Some(1500));
        assert!(request.messages[1].content.contains("Proveedor: Foto Perfecta"));
        assert!(request.messages[1].content.contains("Categoría: Fotografía"));
    }

    #[tokio::test]
    async fn missing_confidence_defaults_and_clamps() {
        let store = InMemoryStore::new();
        let result = extractor(
            Some(Arc::new(MockLlm::replying("{\"totalPrice\": null}"))),
            &PipelineConfig::default(),
        )
        .analyze(&input("Re: x", "y"), &store)
        .await
        .unwrap();
        assert_eq!(result.confidence, 50);

        let result = extractor(
            Some(Arc::new(MockLlm::replying("{\"confidence\": 140}"))),
            &PipelineConfig::default(),
        )
        .analyze(&input("Re: x", "y"), &store)
        .await
        .unwrap();
        assert_eq!(result.confidence, 100);
    }

    #[tokio::test]
    async fn unparseable_output_falls_back() {
        let store = InMemoryStore::new();
        let result = extractor(
            Some(Arc::new(MockLlm::replying("Lo siento, no puedo ayudar con eso."))),
            &PipelineConfig::default(),
        )
        .analyze(&input("Re: boda", "Presupuesto: 1800€"), &store)
        .await
        .unwrap();
        assert!(result.is_heuristic());
        assert_eq!(result.total_price, Some(dec!(1800)));
    }

    #[tokio::test]
    async fn model_failure_falls_back() {
        let store = InMemoryStore::new();
        let llm = MockLlm::failing(|| LlmError::AuthFailed {
            provider: "openai".into(),
        });
        let result = extractor(Some(Arc::new(llm)), &PipelineConfig::default())
            .analyze(&input("Re: boda", "Sin precio todavía"), &store)
            .await
            .unwrap();
        assert!(result.is_heuristic());
        assert_eq!(result.confidence, 30);
    }

    #[tokio::test]
    async fn slow_model_times_out_to_fallback() {
        let store = InMemoryStore::new();
        let mut llm = MockLlm::replying("{\"totalPrice\": 1, \"confidence\": 99}");
        llm.delay = Some(Duration::from_secs(5));
        let config = PipelineConfig {
            model_timeout: Duration::from_millis(20),
            ..PipelineConfig::default()
        };
        let result = extractor(Some(Arc::new(llm)), &config)
            .analyze(&input("Re: boda", "El precio total es 3.200 €"), &store)
            .await
            .unwrap();
        assert!(result.is_heuristic());
        assert_eq!(result.total_price, Some(dec!(3200)));
    }

    #[tokio::test]
    async fn golden_examples_are_embedded() {
        let store = InMemoryStore::new();
        store
            .add_golden_example(GoldenExample {
                category: "Fotografía".into(),
                input_text: "Reportaje completo 1900€".into(),
                expected: serde_json::json!({"totalPrice": 1900}),
            })
            .await;
        let llm = Arc::new(MockLlm::replying("{\"totalPrice\": 2500}"));
        extractor(Some(Arc::clone(&llm)), &PipelineConfig::default())
            .analyze(&input("Re: boda", "2500€"), &store)
            .await
            .unwrap();
        let seen = llm.seen.lock().unwrap();
        assert!(seen[0].messages[1].content.contains("Reportaje completo 1900€"));
    }

    #[test]
    fn blob_includes_attachments_and_truncates() {
        let mut input = input("Re: Presupuesto", "ver adjunto");
        input.attachments.push(AttachmentText {
            filename: "tarifas.txt".into(),
            mime: Some("text/plain".into()),
            text: "Total 2500€".into(),
        });
        let blob = build_text_blob(&input, 15_000);
        assert!(blob.contains("--- DOCUMENTOS ADJUNTOS ---"));
        assert!(blob.contains("[tarifas.txt]:\nTotal 2500€"));

        let cut = build_text_blob(&input, 10);
        assert!(cut.starts_with("Asunto: Re"));
        assert!(cut.ends_with(TRUNCATION_MARKER));
        assert_eq!(cut.chars().count(), 10 + TRUNCATION_MARKER.chars().count());
    }

    #[test]
    fn extract_json_handles_wrapping() {
        assert_eq!(extract_json_object("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(extract_json_object("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(extract_json_object("Here: {\"a\":1} done"), "{\"a\":1}");
        assert_eq!(extract_json_object("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(extract_json_object("sin json"), "sin json");
    }
}
