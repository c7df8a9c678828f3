//! Verb lemmatization for irregular English forms.
//!
//! Regular inflections (`-ed`, `-ing`, `-s`) are left to the stemmer, which
//! strips them reliably. Irregular past tenses and participles are not
//! reachable by suffix stripping, so they are mapped to their base form here.

/// Return the base form of an irregular verb, or the token unchanged.
pub fn lemmatize_verb(token: &str) -> &str {
    match token {
        "was" | "were" | "been" | "am" | "is" | "are" => "be",
        "had" | "has" => "have",
        "did" | "done" | "does" => "do",
        "went" | "gone" => "go",
        "began" | "begun" => "begin",
        "bought" => "buy",
        "brought" => "bring",
        "built" => "build",
        "came" => "come",
        "caught" => "catch",
        "chose" | "chosen" => "choose",
        "dealt" => "deal",
        "drew" | "drawn" => "draw",
        "drove" | "driven" => "drive",
        "fell" | "fallen" => "fall",
        "felt" => "feel",
        "fed" => "feed",
        "fought" => "fight",
        "found" => "find",
        "forgot" | "forgotten" => "forget",
        "gave" | "given" => "give",
        "got" | "gotten" => "get",
        "grew" | "grown" => "grow",
        "held" => "hold",
        "kept" => "keep",
        "knew" | "known" => "know",
        "laid" => "lay",
        "led" => "lead",
        "left" => "leave",
        "lent" => "lend",
        "lost" => "lose",
        "made" => "make",
        "meant" => "mean",
        "met" => "meet",
        "paid" => "pay",
        "ran" => "run",
        "rose" | "risen" => "rise",
        "said" => "say",
        "sat" => "sit",
        "saw" | "seen" => "see",
        "sold" => "sell",
        "sent" => "send",
        "shook" | "shaken" => "shake",
        "shrank" | "shrunk" => "shrink",
        "sought" => "seek",
        "spent" => "spend",
        "spoke" | "spoken" => "speak",
        "stood" => "stand",
        "struck" => "strike",
        "took" | "taken" => "take",
        "taught" => "teach",
        "thought" => "think",
        "told" => "tell",
        "understood" => "understand",
        "won" => "win",
        "wrote" | "written" => "write",
        "withdrew" | "withdrawn" => "withdraw",
        _ => token,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_irregular_forms() {
        assert_eq!(lemmatize_verb("grew"), "grow");
        assert_eq!(lemmatize_verb("sold"), "sell");
        assert_eq!(lemmatize_verb("thought"), "think");
    }

    #[test]
    fn test_regular_forms_untouched() {
        assert_eq!(lemmatize_verb("increased"), "increased");
        assert_eq!(lemmatize_verb("revenue"), "revenue");
    }
}
