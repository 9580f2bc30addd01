//! Structural view of an article for rule checking.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use offer_facts::OfferId;

use crate::article::Article;
use crate::outline::SectionKind;

static MARKDOWN_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\(([^)]*)\)").expect("valid markdown link regex"));

static HTML_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<a\b([^>]*)>(.*?)</a>").expect("valid html link regex"));

static HREF_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#).expect("valid href regex")
});

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid html tag regex"));

/// A hyperlink found in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub anchor: String,
    pub target: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Title,
    Heading,
    Paragraph,
    OfferCard,
    Terms,
    Disclaimer,
}

/// One block of the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub kind: BlockKind,
    /// Outline section the block belongs to; `None` for the title and footer.
    pub section: Option<usize>,
    /// Heading depth for title and heading blocks.
    pub level: Option<u8>,
    pub text: String,
    pub links: Vec<Link>,
    /// Offer the block is about, for cards and terms.
    pub offer_id: Option<OfferId>,
}

impl Block {
    fn new(kind: BlockKind, section: Option<usize>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            kind,
            section,
            level: None,
            links: parse_links(&text),
            text,
            offer_id: None,
        }
    }
}

/// Code of an offer featured in the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeaturedOffer {
    pub id: OfferId,
    pub brand: String,
    pub code: String,
}

/// An article flattened into ordered blocks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub blocks: Vec<Block>,
    pub offers: Vec<FeaturedOffer>,
}

impl Document {
    /// Build the block structure of an article.
    pub fn from_article(article: &Article) -> Self {
        let mut blocks = Vec::new();

        let mut title = Block::new(BlockKind::Title, None, article.title.clone());
        title.level = Some(1);
        blocks.push(title);

        let offers: Vec<FeaturedOffer> = article
            .offers
            .iter()
            .map(|offer| FeaturedOffer {
                id: offer.id.clone(),
                brand: offer.brand().to_string(),
                code: offer.code().to_string(),
            })
            .collect();

        for section in &article.sections {
            let index = Some(section.index);

            if let Some(depth) = section.kind.heading_depth() {
                let mut heading = Block::new(BlockKind::Heading, index, section.heading.clone());
                heading.level = Some(depth);
                blocks.push(heading);
            }

            let refs = article
                .outline
                .section(section.index)
                .map(|s| s.offer_refs.clone())
                .unwrap_or_default();

            for (position, chunk) in split_paragraphs(&section.content).into_iter().enumerate() {
                if section.kind == SectionKind::Offer {
                    let mut card = Block::new(BlockKind::OfferCard, index, chunk);
                    card.offer_id = offers
                        .iter()
                        .filter(|offer| refs.contains(&offer.id))
                        .find(|offer| mentions_code(&card.text, &offer.code))
                        .map(|offer| offer.id.clone())
                        .or_else(|| refs.get(position).cloned());
                    blocks.push(card);
                } else {
                    blocks.push(Block::new(BlockKind::Paragraph, index, chunk));
                }
            }

            for terms in &section.terms {
                let mut block = Block::new(BlockKind::Terms, index, terms.text());
                block.offer_id = Some(terms.offer_id.clone());
                blocks.push(block);
            }
        }

        if !article.footer.trim().is_empty() {
            blocks.push(Block::new(BlockKind::Disclaimer, None, article.footer.clone()));
        }

        Self { blocks, offers }
    }

    /// Offers a block mentions: its card offer, or any offer whose code appears.
    pub fn mentioned_offers(&self, block: &Block) -> Vec<OfferId> {
        match block.kind {
            BlockKind::OfferCard => block.offer_id.iter().cloned().collect(),
            BlockKind::Paragraph => self
                .offers
                .iter()
                .filter(|offer| mentions_code(&block.text, &offer.code))
                .map(|offer| offer.id.clone())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// All document text, lowercased.
    pub fn full_text_lower(&self) -> String {
        self.blocks
            .iter()
            .map(|b| b.text.to_lowercase())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Extract links from markdown `[anchor](target)` and HTML `<a href>` syntax.
pub fn parse_links(text: &str) -> Vec<Link> {
    let mut links: Vec<Link> = MARKDOWN_LINK
        .captures_iter(text)
        .map(|caps| {
            let raw_target = caps.get(2).map_or("", |m| m.as_str()).trim();
            Link {
                anchor: caps.get(1).map_or("", |m| m.as_str()).trim().to_string(),
                target: raw_target.split_whitespace().next().unwrap_or("").to_string(),
            }
        })
        .collect();

    for caps in HTML_LINK.captures_iter(text) {
        let attrs = caps.get(1).map_or("", |m| m.as_str());
        let target = HREF_ATTR
            .captures(attrs)
            .and_then(|href| href.get(1).or_else(|| href.get(2)).or_else(|| href.get(3)))
            .map_or("", |m| m.as_str())
            .trim()
            .to_string();
        let anchor = HTML_TAG
            .replace_all(caps.get(2).map_or("", |m| m.as_str()), "")
            .trim()
            .to_string();
        links.push(Link { anchor, target });
    }

    links
}

/// Check whether text contains a bonus code as a whole token, ignoring case.
pub fn mentions_code(text: &str, code: &str) -> bool {
    let code = code.trim();
    !code.is_empty()
        && text
            .split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_'))
            .any(|token| token.eq_ignore_ascii_case(code))
}

fn split_paragraphs(content: &str) -> Vec<String> {
    content
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}
