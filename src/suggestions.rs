use rand::seq::IndexedRandom;

pub const DEFAULT_COUNT: usize = 4;
pub const MAX_COUNT: usize = 12;

pub const SUGGESTIONS: &[&str] = &[
    "What is artificial intelligence?",
    "How does machine learning work?",
    "Tell me about neural networks",
    "What are the applications of AI in healthcare?",
    "Explain blockchain technology",
    "How do cryptocurrencies work?",
    "What is cloud computing?",
    "Explain quantum computing",
    "What is the Internet of Things?",
    "How does 5G technology work?",
    "What is cybersecurity?",
    "Explain big data analytics",
    "What is edge computing?",
    "What is natural language processing?",
    "How do chatbots work?",
    "Explain autonomous vehicles",
    "How does facial recognition work?",
    "How do solar panels work?",
    "Explain CRISPR technology",
    "How do satellites work?",
    "How do search engines work?",
    "What is data science?",
    "What is reinforcement learning?",
    "How does data encryption work?",
    "What is zero trust security?",
    "How does DevOps work?",
    "Explain serverless computing",
    "What is microservices architecture?",
    "How does containerization work?",
    "Explain SQL vs NoSQL",
    "How do smart contracts work?",
    "How does telemedicine work?",
];

/// Up to `count` distinct prompts in random order, capped at [`MAX_COUNT`].
pub fn random_suggestions(count: usize) -> Vec<&'static str> {
    let count = count.min(MAX_COUNT);
    SUGGESTIONS
        .choose_multiple(&mut rand::rng(), count)
        .copied()
        .collect()
}
