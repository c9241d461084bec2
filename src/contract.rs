//! Structured output contract shared by every model-backed stage.
//!
//! Model output is untrusted JSON. [`validate`] checks it against the JSON
//! schema derived from the target type, deserializes it, then applies the
//! few rules a schema cannot express. It either returns a fully typed value
//! or a [`ValidationError`] naming the offending field path and the violated
//! constraint. Nothing is partially accepted. The same schema is sent to the
//! model so it is asked for exactly this shape.

use jsonschema::error::ValidationErrorKind;
use schemars::gen::{SchemaGenerator, SchemaSettings};
use schemars::schema::{ArrayValidation, InstanceType, Schema, SchemaObject, StringValidation};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use thiserror::Error;

pub const SCORE_MIN: f64 = 0.0;
pub const SCORE_MAX: f64 = 100.0;
pub const MAX_ACTIONABLE_TIPS: usize = 3;
pub const MAX_POSITIVE_HIGHLIGHTS: usize = 2;
pub const MAX_AREAS_FOR_CONSIDERATION: usize = 2;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Constraint {
    #[error("required field is missing")]
    Missing,
    #[error("field is not part of the schema")]
    UnknownField,
    #[error("has the wrong type (got {found})")]
    WrongType { found: &'static str },
    #[error("must not be blank")]
    Blank,
    #[error("`{value}` is not an allowed value")]
    NotInEnum { value: String },
    #[error("{value} is outside [{SCORE_MIN}, {SCORE_MAX}]")]
    OutOfRange { value: f64 },
    #[error("at most {max} entries allowed, got {actual}")]
    TooMany { max: u64, actual: usize },
    #[error("unknown impact level must be explained in its own words, not repeat `{other}`")]
    UnexplainedUnknown { other: String },
    #[error("violates schema: {0}")]
    Schema(String),
    #[error("not valid JSON: {0}")]
    Syntax(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{schema}: `{field}` {constraint}")]
pub struct ValidationError {
    pub schema: &'static str,
    pub field: String,
    pub constraint: Constraint,
}

impl ValidationError {
    fn new(schema: &'static str, field: impl Into<String>, constraint: Constraint) -> Self {
        Self { schema, field: field.into(), constraint }
    }
}

/// A shape the model backend must produce.
pub trait Contract: Sized + Serialize + DeserializeOwned + JsonSchema {
    const SCHEMA: &'static str;

    /// Checks beyond the JSON schema. Blank optional text is cleared here.
    fn refine(&mut self) -> Result<(), ValidationError>;
}

pub fn validate<T: Contract>(raw: &Value) -> Result<T, ValidationError> {
    let schema = response_schema::<T>();
    let validator = jsonschema::validator_for(&schema)
        .map_err(|e| ValidationError::new(T::SCHEMA, "$", Constraint::Schema(e.to_string())))?;
    if let Some(err) = validator.iter_errors(raw).next() {
        return Err(schema_violation(T::SCHEMA, &err));
    }

    let mut value: T = serde_json::from_value(raw.clone())
        .map_err(|e| ValidationError::new(T::SCHEMA, "$", Constraint::Schema(e.to_string())))?;
    value.refine()?;
    Ok(value)
}

/// Validate JSON text. A surrounding Markdown code fence is tolerated.
pub fn validate_json<T: Contract>(text: &str) -> Result<T, ValidationError> {
    let value: Value = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| ValidationError::new(T::SCHEMA, "$", Constraint::Syntax(e.to_string())))?;
    validate(&value)
}

/// JSON schema for `T` with sub-schemas inlined, suitable for a model's
/// structured-output configuration.
pub fn response_schema<T: Contract>() -> Value {
    let generator = SchemaSettings::draft07()
        .with(|s| {
            s.inline_subschemas = true;
            s.meta_schema = None;
        })
        .into_generator();
    let schema = generator.into_root_schema_for::<T>();
    serde_json::to_value(schema).unwrap_or(Value::Null)
}

pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// `/detailedAnalysis/items/0` becomes `detailedAnalysis.items[0]`.
fn pointer_to_field(pointer: &str) -> String {
    let mut field = String::new();
    for segment in pointer.split('/').filter(|s| !s.is_empty()) {
        let segment = segment.replace("~1", "/").replace("~0", "~");
        if segment.parse::<usize>().is_ok() {
            field.push_str(&format!("[{segment}]"));
        } else {
            if !field.is_empty() {
                field.push('.');
            }
            field.push_str(&segment);
        }
    }
    field
}

fn child_field(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn schema_violation(schema: &'static str, err: &jsonschema::ValidationError<'_>) -> ValidationError {
    let path = pointer_to_field(&err.instance_path.to_string());
    let instance: &Value = &err.instance;
    let (field, constraint) = match &err.kind {
        ValidationErrorKind::AdditionalProperties { unexpected } => {
            let key = unexpected.first().map(String::as_str).unwrap_or("?");
            (child_field(&path, key), Constraint::UnknownField)
        }
        ValidationErrorKind::Required { property } => {
            (child_field(&path, property.as_str().unwrap_or("?")), Constraint::Missing)
        }
        ValidationErrorKind::Type { .. } => (path, Constraint::WrongType { found: json_type(instance) }),
        ValidationErrorKind::Enum { .. } => {
            let value = instance.as_str().map(str::to_string).unwrap_or_else(|| instance.to_string());
            (path, Constraint::NotInEnum { value })
        }
        ValidationErrorKind::Minimum { .. } | ValidationErrorKind::Maximum { .. } => {
            (path, Constraint::OutOfRange { value: instance.as_f64().unwrap_or(f64::NAN) })
        }
        ValidationErrorKind::MaxItems { limit } => {
            let actual = instance.as_array().map_or(0, Vec::len);
            (path, Constraint::TooMany { max: *limit, actual })
        }
        ValidationErrorKind::MinLength { .. } => (path, Constraint::Blank),
        _ => (path, Constraint::Schema(err.to_string())),
    };
    let field = if field.is_empty() { "$".to_string() } else { field };
    ValidationError::new(schema, field, constraint)
}

/// Array of non-empty strings, optionally bounded.
fn text_list(max: Option<usize>) -> Schema {
    let item = SchemaObject {
        instance_type: Some(InstanceType::String.into()),
        string: Some(Box::new(StringValidation { min_length: Some(1), ..Default::default() })),
        ..Default::default()
    };
    SchemaObject {
        instance_type: Some(InstanceType::Array.into()),
        array: Some(Box::new(ArrayValidation {
            items: Some(Schema::Object(item).into()),
            max_items: max.map(|m| m as u32),
            ..Default::default()
        })),
        ..Default::default()
    }
    .into()
}

fn tips_schema(_: &mut SchemaGenerator) -> Schema {
    text_list(Some(MAX_ACTIONABLE_TIPS))
}

fn highlights_schema(_: &mut SchemaGenerator) -> Schema {
    text_list(Some(MAX_POSITIVE_HIGHLIGHTS))
}

fn considerations_schema(_: &mut SchemaGenerator) -> Schema {
    text_list(Some(MAX_AREAS_FOR_CONSIDERATION))
}

fn alternatives_schema(_: &mut SchemaGenerator) -> Schema {
    text_list(None)
}

// --- Shapes ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
    Low,
    Medium,
    High,
    Unknown,
}

impl ImpactLevel {
    pub const ALL: [ImpactLevel; 4] =
        [ImpactLevel::Low, ImpactLevel::Medium, ImpactLevel::High, ImpactLevel::Unknown];

    pub fn as_str(self) -> &'static str {
        match self {
            ImpactLevel::Low => "low",
            ImpactLevel::Medium => "medium",
            ImpactLevel::High => "high",
            ImpactLevel::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ImpactLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ImpactCategory {
    /// Detailed analysis for this category. When the level is unknown it must say why.
    #[schemars(length(min = 1))]
    pub analysis: String,
    pub impact_level: ImpactLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum IngredientAssessment {
    #[serde(rename = "Generally Safe")]
    GenerallySafe,
    #[serde(rename = "Use with Caution")]
    UseWithCaution,
    #[serde(rename = "Potential Concern")]
    PotentialConcern,
    #[serde(rename = "Unknown")]
    Unknown,
}

impl IngredientAssessment {
    pub const ALL: [IngredientAssessment; 4] = [
        IngredientAssessment::GenerallySafe,
        IngredientAssessment::UseWithCaution,
        IngredientAssessment::PotentialConcern,
        IngredientAssessment::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            IngredientAssessment::GenerallySafe => "Generally Safe",
            IngredientAssessment::UseWithCaution => "Use with Caution",
            IngredientAssessment::PotentialConcern => "Potential Concern",
            IngredientAssessment::Unknown => "Unknown",
        }
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IngredientDetail {
    #[schemars(length(min = 1))]
    pub name: String,
    pub health_hazards: Option<String>,
    pub environmental_impact: Option<String>,
    pub assessment: IngredientAssessment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IngredientAnalysis {
    pub identified_ingredients: Vec<IngredientDetail>,
    #[schemars(length(min = 1))]
    pub overall_ingredient_summary: String,
    pub ingredient_impact_level: ImpactLevel,
}

/// The four categories every analysis must cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CategoryName {
    CarbonFootprint,
    WaterUsage,
    MaterialSourcing,
    Recyclability,
}

impl CategoryName {
    pub const ALL: [CategoryName; 4] = [
        CategoryName::CarbonFootprint,
        CategoryName::WaterUsage,
        CategoryName::MaterialSourcing,
        CategoryName::Recyclability,
    ];

    pub fn label(self) -> &'static str {
        match self {
            CategoryName::CarbonFootprint => "Carbon Footprint",
            CategoryName::WaterUsage => "Water Usage",
            CategoryName::MaterialSourcing => "Material Sourcing",
            CategoryName::Recyclability => "Recyclability",
        }
    }

    pub fn field(self) -> &'static str {
        match self {
            CategoryName::CarbonFootprint => "carbonFootprint",
            CategoryName::WaterUsage => "waterUsage",
            CategoryName::MaterialSourcing => "materialSourcing",
            CategoryName::Recyclability => "recyclability",
        }
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DetailedAnalysis {
    pub carbon_footprint: ImpactCategory,
    pub water_usage: ImpactCategory,
    pub material_sourcing: ImpactCategory,
    pub recyclability: ImpactCategory,
    pub ingredient_analysis: Option<IngredientAnalysis>,
}

impl DetailedAnalysis {
    pub fn category(&self, name: CategoryName) -> &ImpactCategory {
        match name {
            CategoryName::CarbonFootprint => &self.carbon_footprint,
            CategoryName::WaterUsage => &self.water_usage,
            CategoryName::MaterialSourcing => &self.material_sourcing,
            CategoryName::Recyclability => &self.recyclability,
        }
    }

    pub fn categories(&self) -> impl Iterator<Item = (CategoryName, &ImpactCategory)> {
        CategoryName::ALL.into_iter().map(move |n| (n, self.category(n)))
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AnalysisResult {
    #[schemars(length(min = 1))]
    pub environmental_impact_analysis: String,
    #[schemars(length(min = 1))]
    pub key_factors: String,
    /// Advisory guess derived from the product photo only.
    pub product_identification_guess: Option<String>,
    pub detailed_analysis: DetailedAnalysis,
    #[schemars(range(min = 0, max = 100))]
    pub overall_sustainability_score: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InsightsResult {
    #[schemars(schema_with = "tips_schema")]
    pub actionable_tips: Vec<String>,
    #[schemars(schema_with = "highlights_schema")]
    pub positive_highlights: Vec<String>,
    #[schemars(schema_with = "considerations_schema")]
    pub areas_for_consideration: Vec<String>,
}

impl InsightsResult {
    pub fn is_empty(&self) -> bool {
        self.actionable_tips.is_empty()
            && self.positive_highlights.is_empty()
            && self.areas_for_consideration.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AlternativesResult {
    #[schemars(schema_with = "alternatives_schema")]
    pub alternatives: Vec<String>,
    #[schemars(length(min = 1))]
    pub reasoning: String,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExtractedProduct {
    pub product_name: Option<String>,
    /// Never empty. States the limitation when nothing could be determined.
    #[schemars(length(min = 1))]
    pub product_description: String,
}

// --- Checks the schema cannot express ---

fn require_text(schema: &'static str, field: &str, text: &str) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        return Err(ValidationError::new(schema, field, Constraint::Blank));
    }
    Ok(())
}

fn require_items(schema: &'static str, key: &str, items: &[String]) -> Result<(), ValidationError> {
    items
        .iter()
        .enumerate()
        .try_for_each(|(i, item)| require_text(schema, &format!("{key}[{i}]"), item))
}

fn clear_blank(text: &mut Option<String>) {
    if text.as_deref().is_some_and(|t| t.trim().is_empty()) {
        *text = None;
    }
}

/// An `unknown` level must carry its own explanation, not a text shared
/// with another category.
fn check_unknown_explanations(
    schema: &'static str,
    detailed: &DetailedAnalysis,
) -> Result<(), ValidationError> {
    for (name, category) in detailed.categories() {
        if category.impact_level != ImpactLevel::Unknown {
            continue;
        }
        let own = category.analysis.trim();
        let duplicate = detailed
            .categories()
            .find(|(other, c)| *other != name && c.analysis.trim().eq_ignore_ascii_case(own));
        if let Some((other, _)) = duplicate {
            return Err(ValidationError::new(
                schema,
                format!("detailedAnalysis.{}.analysis", name.field()),
                Constraint::UnexplainedUnknown { other: other.field().to_string() },
            ));
        }
    }
    Ok(())
}

impl Contract for AnalysisResult {
    const SCHEMA: &'static str = "AnalysisResult";

    fn refine(&mut self) -> Result<(), ValidationError> {
        require_text(Self::SCHEMA, "environmentalImpactAnalysis", &self.environmental_impact_analysis)?;
        require_text(Self::SCHEMA, "keyFactors", &self.key_factors)?;
        clear_blank(&mut self.product_identification_guess);

        let detailed = &mut self.detailed_analysis;
        for name in CategoryName::ALL {
            let field = format!("detailedAnalysis.{}.analysis", name.field());
            require_text(Self::SCHEMA, &field, &detailed.category(name).analysis)?;
        }
        if let Some(ia) = &mut detailed.ingredient_analysis {
            let base = "detailedAnalysis.ingredientAnalysis";
            require_text(Self::SCHEMA, &format!("{base}.overallIngredientSummary"), &ia.overall_ingredient_summary)?;
            for (i, ingredient) in ia.identified_ingredients.iter_mut().enumerate() {
                require_text(Self::SCHEMA, &format!("{base}.identifiedIngredients[{i}].name"), &ingredient.name)?;
                clear_blank(&mut ingredient.health_hazards);
                clear_blank(&mut ingredient.environmental_impact);
            }
        }
        check_unknown_explanations(Self::SCHEMA, detailed)
    }
}

impl Contract for InsightsResult {
    const SCHEMA: &'static str = "InsightsResult";

    fn refine(&mut self) -> Result<(), ValidationError> {
        require_items(Self::SCHEMA, "actionableTips", &self.actionable_tips)?;
        require_items(Self::SCHEMA, "positiveHighlights", &self.positive_highlights)?;
        require_items(Self::SCHEMA, "areasForConsideration", &self.areas_for_consideration)
    }
}

impl Contract for AlternativesResult {
    const SCHEMA: &'static str = "AlternativesResult";

    fn refine(&mut self) -> Result<(), ValidationError> {
        require_items(Self::SCHEMA, "alternatives", &self.alternatives)?;
        require_text(Self::SCHEMA, "reasoning", &self.reasoning)
    }
}

impl Contract for ExtractedProduct {
    const SCHEMA: &'static str = "ExtractedProduct";

    fn refine(&mut self) -> Result<(), ValidationError> {
        clear_blank(&mut self.product_name);
        require_text(Self::SCHEMA, "productDescription", &self.product_description)
    }
}
