//! Fixed per-language texts: titles, fallback reminders and generation prompts.

use crate::domain::Language;

/// Notification title.
pub fn title(language: Language) -> &'static str {
    match language {
        Language::Czech => "Připomínka pití vody",
        Language::English => "Water reminder",
    }
}

/// Curated reminders used when generation is unavailable. Never empty.
pub fn fallback_messages(language: Language) -> &'static [&'static str] {
    match language {
        Language::Czech => &[
            "Neboj se, napij se!",
            "Kdo nepije, nežije!",
            "Kde bys byl, kdyby ses nenapil?",
        ],
        Language::English => &["Time to hydrate!", "Drink up!", "Stay refreshed!"],
    }
}

/// Prompt asking the model for one short reminder in `language`.
pub fn prompt(language: Language) -> &'static str {
    match language {
        Language::Czech => {
            "Vytvoř krátkou, přátelskou připomínku pití vody do 8 slov (česky).
Buď kreativní, nenucený, zábavný. Nepoužívej emoji. Vrať pouze text zprávy, nic víc.

Příklady dobrých zpráv:
- \"Je čas se napít! Tvoje tělo ti poděkuje\"
- \"Zůstaň svěží – dej si teď vodu\"
- \"Neboj se, napij se!\"
- \"Kdo nepije, nežije!\"
- \"Kde bys byla, kdyby ses nenapila?\"

Vygeneruj jednu jedinečnou zprávu:"
        }
        Language::English => {
            "Generate a short, friendly water reminder in 10 words or less.
Be creative, encouraging, and casual. Make it feel personal and motivating.
Don't use emojis. Just return the message text, nothing else.

Examples of good messages:
- \"Time to hydrate! Your body will thank you\"
- \"Quick water break? You deserve it\"
- \"Stay refreshed - grab some water now\"
- \"Hydration check! Let's drink up\"

Generate one unique message:"
        }
    }
}
