//! 提示词构建：把诗歌请求转换为模型指令。
//!
//! Turns a validated poem brief into the instruction text sent to the model.
//! The instructions are written in Dutch; the poem itself is written in the
//! requested output language.

use std::fmt::Write as _;

/// Opening line every poem starts with.
pub const OPENING_LINE: &str = "Madrid, 5 december";
/// Closing signature every poem ends with.
pub const SIGNATURE: &str = "Sint en Piet";

/// Tone derived from the friendliness slider (0..=100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Friendly,
    Neutral,
    Teasing,
}

impl Tone {
    pub fn from_friendliness(score: u32) -> Self {
        if score > 70 {
            Tone::Friendly
        } else if score > 40 {
            Tone::Neutral
        } else {
            Tone::Teasing
        }
    }

    pub fn instruction(self) -> &'static str {
        match self {
            Tone::Friendly => "heel vriendelijk en positief",
            Tone::Neutral => "neutraal en gebalanceerd",
            Tone::Teasing => "grappig en scherp met een vleugje humor",
        }
    }
}

/// Display name of a poem language code. Unknown codes fall back to Dutch.
pub fn language_name(code: &str) -> &'static str {
    match code.trim().to_ascii_lowercase().as_str() {
        "en" => "English",
        "ar" => "Arabic",
        "tr" => "Turkish",
        _ => "Nederlands",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AgeBand {
    Child,
    Teen,
    Adult,
}

impl AgeBand {
    fn of(age: u32) -> Self {
        match age {
            0..=9 => AgeBand::Child,
            10..=17 => AgeBand::Teen,
            _ => AgeBand::Adult,
        }
    }
}

/// Who pretends to have written the poem in humanize mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorProfile {
    pub age: u32,
    /// Free-form gender as entered in the form (`jongen`, `meisje`, `man`, `vrouw`).
    pub gender: String,
}

impl AuthorProfile {
    pub fn new(age: u32, gender: impl Into<String>) -> Self {
        Self {
            age,
            gender: gender.into(),
        }
    }

    /// Dutch noun for the author, e.g. "jongetje" for a boy under ten.
    pub fn label(&self) -> &'static str {
        let g = self.gender.trim().to_lowercase();
        match AgeBand::of(self.age) {
            AgeBand::Child if g == "jongen" => "jongetje",
            AgeBand::Child => "meisje",
            AgeBand::Teen if g == "jongen" => "jongen",
            AgeBand::Teen => "meisje",
            AgeBand::Adult if g == "man" => "man",
            AgeBand::Adult => "vrouw",
        }
    }

    fn quirks(&self) -> &'static [&'static str] {
        match AgeBand::of(self.age) {
            AgeBand::Child => &[
                "kleine spelfouten, zoals \"sint\" in plaats van \"Sint\" of \"piet\" in plaats van \"Piet\"",
                "eenvoudige woorden en korte zinnen",
                "af en toe een woord dat net niet klopt maar wel logisch is",
                "hooguit een kleine grammaticafout die bij deze leeftijd past",
            ],
            AgeBand::Teen => &[
                "soms een vergeten woord of een kleine typo",
                "een informeel woord dat er tussendoor glipt",
                "wisselende spelling, bijvoorbeeld \"Sint\" en \"sint\" door elkaar",
                "een woord dat bijna goed is maar net niet",
            ],
            AgeBand::Adult => &[
                "een snelle spelfout of typo",
                "een verkeerd gespeld maar begrijpelijk woord",
                "een kleine inconsistentie in de grammatica",
                "een subtiele fout die doet denken aan een handgeschreven tekst",
            ],
        }
    }

    fn instructions(&self) -> String {
        let age_word = match AgeBand::of(self.age) {
            AgeBand::Child => format!("{}-jarig", self.age),
            _ => format!("{}-jarige", self.age),
        };
        let mut out = String::new();
        let _ = writeln!(out, "HUMANIZE MODUS:");
        let _ = writeln!(
            out,
            "Het gedicht is geschreven door een {}-jarige {} en moet ook zo klinken.",
            self.age,
            self.label()
        );
        let _ = writeln!(
            out,
            "- Verwerk 2 tot 3 kleine foutjes die passen bij een {} {}:",
            age_word,
            self.label()
        );
        for quirk in self.quirks() {
            let _ = writeln!(out, "  * {}", quirk);
        }
        let _ = writeln!(out, "- Houd de foutjes subtiel en natuurlijk, niet opvallend");
        let _ = write!(out, "- Het gedicht moet goed leesbaar blijven");
        out
    }
}

/// Everything the prompt needs, already validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoemBrief {
    pub recipient_name: String,
    pub recipient_facts: Option<String>,
    pub num_lines: u32,
    pub is_classic: bool,
    pub friendliness: u32,
    pub author: Option<AuthorProfile>,
    pub language: String,
}

impl PoemBrief {
    pub fn new(recipient_name: impl Into<String>) -> Self {
        Self {
            recipient_name: recipient_name.into(),
            recipient_facts: None,
            num_lines: 12,
            is_classic: true,
            friendliness: 50,
            author: None,
            language: "nl".to_string(),
        }
    }

    pub fn tone(&self) -> Tone {
        Tone::from_friendliness(self.friendliness)
    }
}

/// Build the model instruction for a brief.
pub fn build_prompt(brief: &PoemBrief) -> String {
    let name = brief.recipient_name.trim();
    let language = language_name(&brief.language);
    let mut rules: Vec<String> = Vec::new();

    let intro = if brief.is_classic {
        rules.push(format!("Het gedicht telt precies {} regels", brief.num_lines));
        rules.push(
            "Verdeel de regels in blokken van 4 (12 regels is dus 4+4+4)".to_string(),
        );
        rules.push(
            "Elk blok rijmt volgens AABB: regel 1 op regel 2, regel 3 op regel 4".to_string(),
        );
        format!(
            "Schrijf een klassiek Sinterklaasgedicht in het {} voor {}.",
            language, name
        )
    } else {
        rules.push(format!(
            "Het gedicht telt ongeveer {} regels; een paar meer of minder mag",
            brief.num_lines
        ));
        rules.push(
            "Wissel de blokgrootte af, bijvoorbeeld 2+3+7 of 3+5+4, niet steeds 4+4+4"
                .to_string(),
        );
        rules.push(
            "Rijm is optioneel; als je rijmt mag het patroon wisselen (AABB, ABAB, ABCB of los rijm)"
                .to_string(),
        );
        format!(
            "Schrijf een vrij Sinterklaasgedicht in het {} voor {}.",
            language, name
        )
    };

    rules.push(format!("De toon is {}", brief.tone().instruction()));
    rules.push(format!("Maak het persoonlijk en richt je tot {}", name));
    if let Some(facts) = brief
        .recipient_facts
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty())
    {
        rules.push(format!("Verwerk deze feiten over {}: {}", name, facts));
    }
    if brief.is_classic {
        rules.push("Blijf dicht bij de traditionele Sinterklaasgedichten".to_string());
        rules.push(format!("Open met \"Lieve {name},\" of \"Beste {name},\""));
    } else {
        rules.push("Modern en vrij mag, zolang het bij Sinterklaas past".to_string());
        rules.push(format!(
            "Open met \"Lieve {name},\", \"Beste {name},\" of een andere persoonlijke aanhef"
        ));
    }
    rules.push("Gebruik geen emoji's in het gedicht".to_string());
    rules.push(
        "Gebruik nooit de term \"zwarte piet\"; schrijf alleen \"Piet\" of \"Sint en Piet\""
            .to_string(),
    );
    rules.push(
        "Noem nooit de kleur van Piet en verbind geen kleuren aan mensen of personages"
            .to_string(),
    );
    if brief.is_classic {
        rules.push("Houd je strikt aan de blokken van 4 regels".to_string());
    } else {
        rules.push("Laat de vorm natuurlijk stromen zonder vast patroon".to_string());
    }

    let mut prompt = String::new();
    let _ = writeln!(prompt, "{}", intro);
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "Instructies:");
    for rule in &rules {
        let _ = writeln!(prompt, "- {}", rule);
    }
    if let Some(author) = &brief.author {
        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "{}", author.instructions());
    }
    let _ = writeln!(prompt);
    let _ = writeln!(
        prompt,
        "BELANGRIJK: begin met \"{}\" gevolgd door twee lege regels, en sluit af met twee lege regels gevolgd door \"{}\".",
        OPENING_LINE, SIGNATURE
    );
    let _ = writeln!(prompt);
    let _ = write!(
        prompt,
        "Geef alleen het gedicht terug, zonder uitleg of opmerkingen."
    );
    prompt
}
