use std::time::{Duration, Instant};
use whatlang::{Lang, detect};

/// Outcome of statistical language identification.
#[derive(Debug, Clone)]
pub struct Detection {
    pub lang: Option<String>,
    pub duration: Duration,
    pub reliable: bool,
}

/// Identify the language of extracted text. The result is accepted only when
/// whatlang marks it reliable; otherwise the language stays unset and the
/// caller can count the unreliable attempt.
pub fn detect_language(text: &str) -> Detection {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Detection {
            lang: None,
            duration: Duration::ZERO,
            reliable: false,
        };
    }

    let start = Instant::now();
    let info = detect(trimmed);
    let duration = start.elapsed();

    match info {
        Some(info) if info.is_reliable() => Detection {
            lang: Some(lang_to_code(info.lang())),
            duration,
            reliable: true,
        },
        _ => Detection {
            lang: None,
            duration,
            reliable: false,
        },
    }
}

fn lang_to_code(lang: Lang) -> String {
    match lang {
        Lang::Eng => "en".to_string(),
        Lang::Rus => "ru".to_string(),
        Lang::Cmn => "zh".to_string(),
        Lang::Spa => "es".to_string(),
        Lang::Fra => "fr".to_string(),
        Lang::Deu => "de".to_string(),
        Lang::Jpn => "ja".to_string(),
        Lang::Kor => "ko".to_string(),
        Lang::Por => "pt".to_string(),
        Lang::Ita => "it".to_string(),
        Lang::Nld => "nl".to_string(),
        Lang::Pol => "pl".to_string(),
        Lang::Tur => "tr".to_string(),
        Lang::Swe => "sv".to_string(),
        Lang::Dan => "da".to_string(),
        Lang::Fin => "fi".to_string(),
        Lang::Heb => "he".to_string(),
        Lang::Ara => "ar".to_string(),
        Lang::Hin => "hi".to_string(),
        Lang::Tha => "th".to_string(),
        Lang::Vie => "vi".to_string(),
        _ => format!("{:?}", lang).to_lowercase(),
    }
}
