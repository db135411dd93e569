use serde::Serialize;

/// Canonical emotion categories the overlay knows how to color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Happy,
    Sad,
    Angry,
    Surprise,
    Fear,
    Disgust,
    Contempt,
    Neutral,
}

impl Emotion {
    pub const ALL: [Emotion; 8] = [
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Surprise,
        Emotion::Fear,
        Emotion::Disgust,
        Emotion::Contempt,
        Emotion::Neutral,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            Emotion::Happy => "Happy",
            Emotion::Sad => "Sad",
            Emotion::Angry => "Angry",
            Emotion::Surprise => "Surprised",
            Emotion::Fear => "Afraid",
            Emotion::Disgust => "Disgusted",
            Emotion::Contempt => "Contempt",
            Emotion::Neutral => "Neutral",
        }
    }

    pub fn color(&self) -> Rgba {
        match self {
            Emotion::Happy => Rgba(0xFA, 0xCC, 0x15, 0xFF),
            Emotion::Sad => Rgba(0x3B, 0x82, 0xF6, 0xFF),
            Emotion::Angry => Rgba(0xEF, 0x44, 0x44, 0xFF),
            Emotion::Surprise => Rgba(0xF9, 0x73, 0x16, 0xFF),
            Emotion::Fear => Rgba(0xA8, 0x55, 0xF7, 0xFF),
            Emotion::Disgust => Rgba(0x22, 0xC5, 0x5E, 0xFF),
            Emotion::Contempt => Rgba(0x14, 0xB8, 0xA6, 0xFF),
            Emotion::Neutral => Rgba(0x9C, 0xA3, 0xAF, 0xFF),
        }
    }

    /// Map free-text labels (several languages, common spellings) onto a
    /// canonical emotion.
    pub fn canonicalize(label: &str) -> Option<Emotion> {
        let key = label.trim().to_lowercase();
        SYNONYMS
            .iter()
            .find(|(_, words)| words.contains(&key.as_str()))
            .map(|(emotion, _)| *emotion)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rgba(pub u8, pub u8, pub u8, pub u8);

impl Rgba {
    pub fn hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

/// Used for categories outside the palette.
pub const DEFAULT_COLOR: Rgba = Rgba(0xFF, 0xFF, 0xFF, 0xFF);

const SYNONYMS: [(Emotion, &[&str]); 8] = [
    (
        Emotion::Happy,
        &[
            "happy", "happiness", "joy", "smile", "smiling", "feliz", "felicidad", "alegre",
            "alegría", "alegria", "heureux", "heureuse", "joie", "senang", "bahagia", "glücklich",
            "froh",
        ],
    ),
    (
        Emotion::Sad,
        &[
            "sad", "sadness", "unhappy", "triste", "tristeza", "tristesse", "sedih", "traurig",
        ],
    ),
    (
        Emotion::Angry,
        &[
            "angry", "anger", "mad", "enojado", "enojo", "enfadado", "ira", "raiva", "bravo",
            "colère", "colere", "fâché", "marah", "wütend", "wut",
        ],
    ),
    (
        Emotion::Surprise,
        &[
            "surprise", "surprised", "sorpresa", "sorprendido", "surpresa", "surpreso",
            "surpris", "terkejut", "kaget", "überrascht",
        ],
    ),
    (
        Emotion::Fear,
        &[
            "fear", "afraid", "scared", "fearful", "miedo", "asustado", "medo", "peur",
            "takut", "angst",
        ],
    ),
    (
        Emotion::Disgust,
        &[
            "disgust", "disgusted", "asco", "disgusto", "nojo", "dégoût", "degout", "jijik",
            "ekel",
        ],
    ),
    (
        Emotion::Contempt,
        &["contempt", "desprecio", "desprezo", "mépris", "mepris", "verachtung"],
    ),
    (
        Emotion::Neutral,
        &["neutral", "calm", "neutro", "neutra", "neutre", "tenang", "biasa"],
    ),
];

/// Canonical label, chip text and color for a raw emotion label.
#[derive(Debug, Clone, PartialEq)]
pub struct EmotionStyle {
    pub emotion: Option<Emotion>,
    pub text: String,
    pub color: Rgba,
}

impl EmotionStyle {
    pub fn resolve(label: &str) -> Self {
        match Emotion::canonicalize(label) {
            Some(emotion) => Self {
                emotion: Some(emotion),
                text: emotion.display_name().to_string(),
                color: emotion.color(),
            },
            None => {
                let trimmed = label.trim();
                Self {
                    emotion: None,
                    text: if trimmed.is_empty() {
                        "?".to_string()
                    } else {
                        trimmed.to_string()
                    },
                    color: DEFAULT_COLOR,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synonyms_collapse_across_languages() {
        for label in ["happy", "Feliz", " JOIE ", "senang", "glücklich"] {
            assert_eq!(Emotion::canonicalize(label), Some(Emotion::Happy), "{label}");
        }
        assert_eq!(Emotion::canonicalize("enojado"), Some(Emotion::Angry));
        assert_eq!(Emotion::canonicalize("surpreso"), Some(Emotion::Surprise));
        assert_eq!(Emotion::canonicalize("Tristeza"), Some(Emotion::Sad));
    }

    #[test]
    fn every_emotion_canonicalizes_its_own_name() {
        for emotion in Emotion::ALL {
            let name = serde_json::to_value(emotion).unwrap();
            assert_eq!(Emotion::canonicalize(name.as_str().unwrap()), Some(emotion));
        }
    }

    #[test]
    fn unknown_category_gets_default_color() {
        let style = EmotionStyle::resolve("bored");
        assert_eq!(style.emotion, None);
        assert_eq!(style.text, "bored");
        assert_eq!(style.color, DEFAULT_COLOR);

        assert_eq!(EmotionStyle::resolve("  ").text, "?");
    }

    #[test]
    fn known_category_uses_palette() {
        let style = EmotionStyle::resolve("Alegría");
        assert_eq!(style.emotion, Some(Emotion::Happy));
        assert_eq!(style.text, "Happy");
        assert_eq!(style.color.hex(), "#facc15");
    }
}
