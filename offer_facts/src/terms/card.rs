//! Promo cards - the deterministic call-to-action block placed for each offer.

use crate::offer::Offer;

/// Render the promo card for an offer as markdown.
///
/// The card states only the brand, the bonus description, and the code exactly as
/// they appear on the offer. The claim link is omitted when the offer has no URL.
pub fn render_offer_card(offer: &Offer) -> String {
    let mut lines = vec![format!("> **{} Promo**", offer.brand())];
    if !offer.bonus().is_empty() {
        lines.push(format!("> {}", offer.bonus()));
    }
    lines.push(">".to_string());
    lines.push(format!("> **Bonus code:** `{}`", offer.code()));

    let url = offer.source_url.trim();
    if !url.is_empty() {
        lines.push(">".to_string());
        lines.push(format!("> [Claim {} Offer]({})", offer.brand(), url));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offer::OfferId;

    #[test]
    fn test_card_contains_exact_pairing() {
        let offer = Offer::new(OfferId::new("cz"), "Caesars", "CZRBONUS")
            .with_bonus("First bet up to $1,000 back")
            .with_source_url("https://go.example.org/caesars");

        let card = render_offer_card(&offer);
        assert!(card.contains("**Caesars Promo**"));
        assert!(card.contains("`CZRBONUS`"));
        assert!(card.contains("[Claim Caesars Offer](https://go.example.org/caesars)"));
    }

    #[test]
    fn test_card_without_url_has_no_link() {
        let offer = Offer::new(OfferId::new("cz"), "Caesars", "CZRBONUS");
        let card = render_offer_card(&offer);
        assert!(!card.contains("]("));
    }
}
