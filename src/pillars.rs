use crate::models::{Behaviors, Polarity};

/// Assigned when no behavior phrase matches any pillar.
pub const DEFAULT_PILLAR: &str = "Responsibility";

pub const DEFAULT_PILLAR_COLOR: &str = "#000000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pillar {
    pub name: String,
    pub color: String,
    pub icon_symbol: String,
    pub description: String,
    pub positive_behaviors: Vec<String>,
    pub positive_recognition_examples: Vec<String>,
    pub negative_behaviors: Vec<String>,
    pub learning_focus: Vec<String>,
}

impl Pillar {
    pub fn behaviors_for(&self, polarity: Polarity) -> &[String] {
        match polarity {
            Polarity::Positive => &self.positive_behaviors,
            Polarity::Negative => &self.negative_behaviors,
        }
    }

    /// Loose keyword match: either phrase contains the other, ignoring case.
    fn matches(&self, polarity: Polarity, phrase_lower: &str) -> bool {
        self.behaviors_for(polarity).iter().any(|keyword| {
            let keyword = keyword.to_lowercase();
            phrase_lower.contains(&keyword) || keyword.contains(phrase_lower)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Positive,
    Negative,
    Recognition,
    LearningFocus,
}

impl ItemKind {
    pub const ALL: [ItemKind; 4] = [
        ItemKind::Positive,
        ItemKind::Recognition,
        ItemKind::Negative,
        ItemKind::LearningFocus,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Positive => "positive",
            ItemKind::Negative => "negative",
            ItemKind::Recognition => "recognition",
            ItemKind::LearningFocus => "learning_focus",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        ItemKind::ALL.into_iter().find(|kind| kind.as_str() == value)
    }
}

/// A pillar header as stored, before its item lists are attached.
#[derive(Debug, Clone)]
pub struct PillarRow {
    pub name: String,
    pub color: String,
    pub icon_symbol: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct PillarItemRow {
    pub pillar_name: String,
    pub kind: ItemKind,
    pub item: String,
}

/// Ordered set of pillars. Classification output follows this order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Taxonomy {
    pillars: Vec<Pillar>,
}

impl Taxonomy {
    pub fn new(pillars: Vec<Pillar>) -> Self {
        Self { pillars }
    }

    pub fn pillars(&self) -> &[Pillar] {
        &self.pillars
    }

    pub fn is_empty(&self) -> bool {
        self.pillars.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Pillar> {
        self.pillars.iter().find(|pillar| pillar.name == name)
    }

    /// Reassembles pillars from header rows and grouped item rows. Rows with a
    /// blank pillar name are ignored; a later header with an existing name
    /// replaces the earlier one in place.
    pub fn rebuild(rows: Vec<PillarRow>, items: Vec<PillarItemRow>) -> Self {
        let mut pillars: Vec<Pillar> = Vec::new();

        for row in rows {
            let name = row.name.trim().to_string();
            if name.is_empty() {
                continue;
            }

            let color = if row.color.trim().is_empty() {
                DEFAULT_PILLAR_COLOR.to_string()
            } else {
                row.color.trim().to_string()
            };

            let pillar = Pillar {
                name: name.clone(),
                color,
                icon_symbol: row.icon_symbol,
                description: row.description,
                positive_behaviors: Vec::new(),
                positive_recognition_examples: Vec::new(),
                negative_behaviors: Vec::new(),
                learning_focus: Vec::new(),
            };

            match pillars.iter_mut().find(|existing| existing.name == name) {
                Some(existing) => *existing = pillar,
                None => pillars.push(pillar),
            }
        }

        for row in items {
            if row.item.trim().is_empty() {
                continue;
            }
            let Some(pillar) = pillars
                .iter_mut()
                .find(|pillar| pillar.name == row.pillar_name.trim())
            else {
                continue;
            };

            let list = match row.kind {
                ItemKind::Positive => &mut pillar.positive_behaviors,
                ItemKind::Negative => &mut pillar.negative_behaviors,
                ItemKind::Recognition => &mut pillar.positive_recognition_examples,
                ItemKind::LearningFocus => &mut pillar.learning_focus,
            };
            list.push(row.item);
        }

        Self { pillars }
    }

    /// Flattens the taxonomy back into header and item rows for storage.
    pub fn to_rows(&self) -> (Vec<PillarRow>, Vec<PillarItemRow>) {
        let mut rows = Vec::new();
        let mut items = Vec::new();

        for pillar in &self.pillars {
            rows.push(PillarRow {
                name: pillar.name.clone(),
                color: pillar.color.clone(),
                icon_symbol: pillar.icon_symbol.clone(),
                description: pillar.description.clone(),
            });

            for kind in ItemKind::ALL {
                let list = match kind {
                    ItemKind::Positive => &pillar.positive_behaviors,
                    ItemKind::Negative => &pillar.negative_behaviors,
                    ItemKind::Recognition => &pillar.positive_recognition_examples,
                    ItemKind::LearningFocus => &pillar.learning_focus,
                };
                items.extend(list.iter().map(|item| PillarItemRow {
                    pillar_name: pillar.name.clone(),
                    kind,
                    item: item.clone(),
                }));
            }
        }

        (rows, items)
    }
}

/// Returns the pillars whose keyword lists match any of the behaviors, in
/// taxonomy order. Never empty: falls back to [`DEFAULT_PILLAR`].
pub fn classify_pillars(
    taxonomy: &Taxonomy,
    polarity: Polarity,
    behaviors: &Behaviors,
) -> Vec<String> {
    let phrases: Vec<String> = behaviors
        .normalized()
        .iter()
        .map(|phrase| phrase.to_lowercase())
        .collect();

    let matched: Vec<String> = taxonomy
        .pillars()
        .iter()
        .filter(|pillar| phrases.iter().any(|phrase| pillar.matches(polarity, phrase)))
        .map(|pillar| pillar.name.clone())
        .collect();

    if matched.is_empty() {
        vec![DEFAULT_PILLAR.to_string()]
    } else {
        matched
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

impl Default for Taxonomy {
    /// The six character pillars shipped with the system.
    fn default() -> Self {
        Self::new(vec![
            Pillar {
                name: "Trustworthiness".to_string(),
                color: "#00008B".to_string(),
                icon_symbol: "✋".to_string(),
                description: "Building honesty, reliability, and integrity.".to_string(),
                positive_behaviors: strings(&[
                    "telling the truth, even when difficult",
                    "completing work with academic honesty",
                    "returning found items to rightful owners",
                    "following through on commitments and promises",
                    "avoiding the spread of rumors or gossip",
                    "being reliable and dependable in group settings",
                    "using digital resources ethically (e.g., citing sources, submitting ones' own original work)",
                ]),
                positive_recognition_examples: strings(&[
                    "showed great integrity by being honest today.",
                    "demonstrated academic honesty on their work.",
                    "acted responsibly by returning a found item.",
                    "followed through reliably on a commitment.",
                    "chose not to participate in gossip.",
                    "was a trustworthy and dependable group member.",
                    "showed digital responsibility in their work.",
                ]),
                negative_behaviors: strings(&[
                    "being dishonest or misleading others",
                    "copying work, cheating, or plagiarizing",
                    "taking items that belong to others",
                    "breaking promises or commitments",
                    "participating in gossip or spreading rumors",
                    "blaming others unfairly to avoid consequences",
                    "misrepresenting online sources or plagiarizing digital work",
                ]),
                learning_focus: strings(&[
                    "developing honesty, even when it's challenging.",
                    "understanding and practicing academic integrity.",
                    "respecting others' property and belongings.",
                    "learning the importance of keeping one's word.",
                    "building skills to avoid participating in or spreading gossip.",
                    "developing reliability and accountability.",
                    "learning responsible digital research and citation skills.",
                ]),
            },
            Pillar {
                name: "Respect".to_string(),
                color: "#FFBF00".to_string(),
                icon_symbol: "🤝".to_string(),
                description: "Treating others, property, and oneself with consideration.".to_string(),
                positive_behaviors: strings(&[
                    "using polite and appropriate language with peers and adults",
                    "listening actively and waiting for one's turn to speak",
                    "handling personal and school property carefully",
                    "following rules and directions willingly",
                    "expressing disagreements calmly and respectfully",
                    "showing appreciation for diverse perspectives and backgrounds",
                    "engaging in respectful online communication",
                ]),
                positive_recognition_examples: strings(&[
                    "communicated respectfully with others today.",
                    "listened attentively during discussions.",
                    "handled materials responsibly.",
                    "followed directions cooperatively.",
                    "expressed opinions respectfully.",
                    "showed appreciation for different viewpoints.",
                    "demonstrated respectful online behavior.",
                ]),
                negative_behaviors: strings(&[
                    "interrupting or talking over others frequently",
                    "communicating with disrespectful, rude, or offensive language",
                    "showing disrespect through tone, gestures, or expressions",
                    "wrestling with other students or not keeping hands to self",
                    "ignoring or defying reasonable instructions",
                    "mocking, teasing, or putting others down",
                    "engaging in disrespectful or inappropriate online interactions",
                ]),
                learning_focus: strings(&[
                    "practicing active listening and patience in conversations.",
                    "developing constructive communication and appropriate language.",
                    "learning to show respect through actions and body language.",
                    "understanding the importance of caring for property.",
                    "learning to follow directions and school expectations.",
                    "building empathy and respectful ways to interact.",
                    "developing positive digital communication habits.",
                ]),
            },
            Pillar {
                name: "Responsibility".to_string(),
                color: "#228B22".to_string(),
                icon_symbol: "⭐".to_string(),
                description: "Taking ownership of actions, duties, and learning.".to_string(),
                positive_behaviors: strings(&[
                    "submitting assignments on time and completed thoughtfully",
                    "coming prepared for class with necessary materials",
                    "cleaning up one's own workspace and shared areas",
                    "acknowledging mistakes and learning from them",
                    "taking good care of borrowed or shared items",
                    "completing assigned tasks and chores reliably",
                    "persisting through challenges and seeking help appropriately",
                    "managing time effectively for assignments and projects",
                ]),
                positive_recognition_examples: strings(&[
                    "submitted thoughtful work on time.",
                    "came to class well-prepared today.",
                    "helped keep our space tidy.",
                    "took responsibility for a mistake and learned from it.",
                    "cared for shared materials responsibly.",
                    "completed assigned tasks reliably.",
                    "showed perseverance on a challenging task.",
                    "managed time effectively on the recent assignment.",
                ]),
                negative_behaviors: strings(&[
                    "frequently submitting late or incomplete work",
                    "being off-task or distracting to others",
                    "leaving personal or shared areas messy or disorganized",
                    "making excuses or blaming others for mistakes",
                    "losing or damaging items carelessly",
                    "being unprepared for class activities or discussions",
                    "giving up easily when tasks become challenging",
                    "struggling to manage deadlines for assignments/projects",
                ]),
                learning_focus: strings(&[
                    "developing organizational skills for assignments.",
                    "building habits for preparedness and organization.",
                    "learning to take responsibility for personal and shared spaces.",
                    "developing accountability and a growth mindset.",
                    "practicing care for personal and shared belongings.",
                    "strengthening preparedness for learning.",
                    "building resilience and problem-solving skills.",
                    "improving time management and planning skills.",
                ]),
            },
            Pillar {
                name: "Fairness".to_string(),
                color: "#FF8C00".to_string(),
                icon_symbol: "⚖️".to_string(),
                description: "Playing by the rules, taking turns, and being open-minded.".to_string(),
                positive_behaviors: strings(&[
                    "taking turns and sharing opportunities equitably",
                    "playing games and participating according to rules",
                    "listening openly to different viewpoints before judging",
                    "actively including others in activities and groups",
                    "sharing resources appropriately and considering others' needs",
                    "treating everyone impartially and justly",
                ]),
                positive_recognition_examples: strings(&[
                    "shared materials/opportunities fairly with others.",
                    "played fairly and followed the rules.",
                    "listened open-mindedly to different ideas.",
                    "made an effort to include others today.",
                    "shared resources thoughtfully.",
                    "treated peers in a fair and just manner.",
                ]),
                negative_behaviors: strings(&[
                    "cutting ahead, skipping turns, or dominating activities",
                    "cheating or disregarding rules in games/activities",
                    "ignoring different perspectives or being closed-minded",
                    "deliberately excluding peers from activities or groups",
                    "using more resources than necessary or permitted",
                    "blaming others unjustly or showing favoritism",
                ]),
                learning_focus: strings(&[
                    "practicing sharing and taking turns.",
                    "understanding the importance of rules and fair play.",
                    "developing open-mindedness and considering diverse views.",
                    "building inclusive behaviors and empathy.",
                    "learning to share resources equitably.",
                    "developing impartiality and avoiding bias.",
                ]),
            },
            Pillar {
                name: "Caring".to_string(),
                color: "#DC143C".to_string(),
                icon_symbol: "❤️".to_string(),
                description: "Showing kindness, compassion, and empathy towards others.".to_string(),
                positive_behaviors: strings(&[
                    "offering help or support to peers in need",
                    "comforting or showing empathy towards others experiencing difficulty",
                    "communicating with kind words and giving genuine compliments",
                    "welcoming new students or including peers who seem left out",
                    "expressing gratitude and appreciation towards others",
                    "sharing items willingly and thoughtfully",
                    "standing up for peers respectfully when witnessing unkindness",
                ]),
                positive_recognition_examples: strings(&[
                    "showed kindness by helping a peer.",
                    "was compassionate and supportive to someone today.",
                    "communicated with kind words that made a positive impact.",
                    "made an effort to welcome or include someone.",
                    "expressed gratitude thoughtfully.",
                    "shared generously with others.",
                    "acted as a supportive friend/classmate.",
                ]),
                negative_behaviors: strings(&[
                    "being unkind, teasing, or making fun of others",
                    "ignoring peers who clearly need assistance or support",
                    "engaging in mean-spirited gossip or spreading rumors",
                    "laughing at the mistakes or struggles of others",
                    "acting selfishly or disregarding the feelings/needs of others",
                    "excluding others purposefully from groups or activities",
                    "being insensitive to the feelings of others",
                ]),
                learning_focus: strings(&[
                    "cultivating empathy and kindness in interactions.",
                    "developing awareness of others' needs and offering support.",
                    "practicing positive communication and avoiding gossip.",
                    "building sensitivity to how words/actions affect others.",
                    "learning to consider others' perspectives and needs.",
                    "developing inclusive social skills.",
                    "increasing awareness and sensitivity to others' feelings.",
                ]),
            },
            Pillar {
                name: "Citizenship".to_string(),
                color: "#4B0082".to_string(),
                icon_symbol: "🏠".to_string(),
                description: "Contributing positively to the school and community.".to_string(),
                positive_behaviors: strings(&[
                    "following school and classroom rules consistently",
                    "working cooperatively and respectfully with peers in groups",
                    "helping keep school spaces clean, orderly, and safe",
                    "showing respect for school staff, volunteers, and visitors",
                    "participating positively in school events and activities",
                    "contributing to a safe and welcoming school environment",
                    "reporting safety concerns or rule violations responsibly",
                    "demonstrating appropriate and ethical use of school technology",
                ]),
                positive_recognition_examples: strings(&[
                    "followed classroom/school rules reliably.",
                    "collaborated effectively and respectfully in a group.",
                    "helped maintain a positive school environment.",
                    "showed respect for adults in the school community.",
                    "participated positively in a school activity.",
                    "contributed to a welcoming atmosphere.",
                    "acted responsibly regarding a safety/rule concern.",
                    "demonstrated appropriate and ethical use of school technology.",
                ]),
                negative_behaviors: strings(&[
                    "breaking or consistently ignoring established rules",
                    "littering or failing to clean up after oneself",
                    "damaging school property intentionally or carelessly",
                    "refusing to cooperate or being disruptive in groups",
                    "disrupting the learning environment for others",
                    "ignoring or violating safety procedures",
                    "avoiding participation or contributing negatively to activities",
                    "misusing school technology or accessing inappropriate content",
                ]),
                learning_focus: strings(&[
                    "understanding and respecting community rules.",
                    "developing responsibility for shared spaces.",
                    "learning to respect property and resources.",
                    "building collaboration and teamwork skills.",
                    "understanding one's impact on the learning environment.",
                    "developing awareness of safety procedures.",
                    "learning the value of positive participation.",
                    "practicing responsible and ethical technology use.",
                ]),
            },
        ])
    }
}
