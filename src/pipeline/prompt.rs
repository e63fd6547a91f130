use crate::models::{PatientIntake, RiskFinding, UrgencyAssessment};

/// Build the urgency prompt for one patient.
pub fn build_prioritization_prompt(intake: &PatientIntake) -> String {
    format!(
        r#"You are a clinical triage AI assistant for Tandarust AI, a healthcare clinic system.
Given a patient's information, assess the urgency of their condition and assign a priority score.

**Patient Information:**
- Name: {name}
- Age: {age}
- Gender: {gender}
- Symptoms: {symptoms}
- Medical History: {history}

**Instructions:**
1. Analyze the symptoms in the context of the patient's age, gender, and history.
2. Consider red-flag symptoms that require immediate attention (chest pain, stroke signs, breathing difficulty, etc.).
3. Assign an urgency score from 0 to 100:
   - 0-25: Low (routine, non-urgent)
   - 26-55: Medium (needs attention within 30 min)
   - 56-80: High (needs attention within 5-10 min)
   - 81-100: Critical (immediate attention required)
4. Estimate a wait time based on urgency.
5. Provide brief clinical reasoning.

**You MUST respond with ONLY valid JSON in this exact format:**
{{
    "urgency_score": <integer 0-100>,
    "urgency_level": "<Low|Medium|High|Critical>",
    "wait_time": "<e.g. Immediate, 5 min, 20 min, 45 min>",
    "reasoning": "<2-3 sentence clinical reasoning>"
}}

Respond with JSON only. No markdown, no code fences, no extra text.
"#,
        name = intake.name,
        age = intake.age_text(),
        gender = intake.gender_text(),
        symptoms = intake.symptoms,
        history = intake.history_text(),
    )
}

/// The risk prompt deliberately omits the patient's name.
pub fn build_risk_prompt(intake: &PatientIntake) -> String {
    format!(
        r#"You are a clinical risk analysis AI for Tandarust AI, a healthcare system.
Given a patient's information, identify potential health risks and score each one.

**Patient Information:**
- Age: {age}
- Gender: {gender}
- Symptoms: {symptoms}
- Medical History: {history}

**Instructions:**
1. Identify 1-5 potential health conditions the patient may be at risk for.
2. Consider the symptoms, age, gender, and history together.
3. For each condition, assign a risk score (0-100) and a severity level.
4. Common conditions to consider: Cardiac Event, Stroke, Diabetes Complication, COPD Exacerbation, Infection, Neurological, Hypertension, Respiratory, Autoimmune, Cancer, Kidney Disease, etc.
5. Only include conditions that are relevant to this specific patient.

**Score ranges:**
- 0-30: Low risk
- 31-60: Medium risk
- 61-80: High risk
- 81-100: Critical risk

**You MUST respond with ONLY valid JSON in this exact format:**
{{
    "risk_scores": [
        {{
            "condition": "<condition name>",
            "score": <integer 0-100>,
            "level": "<Low|Medium|High|Critical>",
            "reason": "<one sentence explanation of why this risk was identified>"
        }}
    ]
}}

Respond with JSON only. No markdown, no code fences, no extra text.
"#,
        age = intake.age_text(),
        gender = intake.gender_text(),
        symptoms = intake.symptoms,
        history = intake.history_text(),
    )
}

/// `"cond: score/100 (level)"` joined with `", "`.
pub fn render_risk_findings(findings: &[RiskFinding]) -> String {
    if findings.is_empty() {
        return "No specific risks identified".to_string();
    }
    findings
        .iter()
        .map(RiskFinding::prompt_line)
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn build_summary_prompt(
    intake: &PatientIntake,
    urgency: &UrgencyAssessment,
    findings: &[RiskFinding],
) -> String {
    format!(
        r#"You are a clinical summary AI for Tandarust AI, a healthcare system.
Generate a comprehensive, doctor-ready clinical summary and a patient-friendly summary.

**Patient Information:**
- Name: {name}
- Age: {age}
- Gender: {gender}
- Symptoms: {symptoms}
- Medical History: {history}
- Urgency Level: {level} (Score: {score}/100)
- Risk Scores: {risks}

**Instructions:**
1. **Clinical Summary (English):** 2-4 professional, precise sentences for doctors. Highlight critical findings first. Include monitoring/test suggestions.
2. **Clinical Summary (Urdu):** Translate the key points of the clinical summary into clean, professional Urdu.
3. **Patient Perspective (English):** A simple, encouraging, non-alarming explanation for the patient about what happens next.
4. **Suggested Actions:** List 2-3 immediate medical steps or tests recommended.

**You MUST respond with ONLY valid JSON in this exact format:**
{{
    "clinical_summary_en": "<professional clinical summary>",
    "clinical_summary_ur": "<professional clinical summary in Urdu>",
    "patient_friendly_summary": "<plain language explanation for patient>",
    "suggested_actions": ["action 1", "action 2"]
}}

Respond with JSON only. No markdown, no code fences, no extra text.
"#,
        name = intake.name,
        age = intake.age_text(),
        gender = intake.gender_text(),
        symptoms = intake.symptoms,
        history = intake.history_text(),
        level = urgency.level,
        score = urgency.score,
        risks = render_risk_findings(findings),
    )
}

pub const TRANSCRIPTION_PROMPT: &str = "TRANSCRIPTION TASK: Listen to this audio and write down \
everything said. If it's a doctor describing a patient, summarize the symptoms. If there is no \
speech, just say 'No audible speech detected'. DO NOT give a preamble.";

pub const EXTRACTION_PROMPT: &str = r#"INTAKE EXTRACTION TASK: Listen to this audio of a patient or clinician describing a visit.
If there is no speech, just say 'No audible speech detected'.
Otherwise respond with ONLY valid JSON in this exact format:
{
    "name": "<patient name or null>",
    "age": <integer or null>,
    "gender": "<Male|Female|Other or null>",
    "symptoms": "<concise description of the symptoms>",
    "raw_transcription": "<verbatim transcription of the audio>"
}
Respond with JSON only. No markdown, no code fences, no extra text.
"#;

pub const PRESCRIPTION_OCR_PROMPT: &str = r#"PRESCRIPTION OCR TASK: Read this prescription image.
Extract the following fields into JSON:
- patient_name (at the top)
- age (number)
- gender (Male/Female)
- medications (list of {drug, dosage, frequency, duration})
- notes (any extra information written on the prescription)

Respond with JSON only. No text, no markdown.
"#;
