#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    Website,
    Portfolio,
    Ecommerce,
    LandingPage,
    Chatbot,
}

#[derive(Debug, Clone, Copy)]
pub struct Placeholder {
    pub token: &'static str,
    pub prompt: &'static str,
    pub max_tokens: u32,
    /// Used when the enhancement call fails.
    pub fallback: &'static str,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 5] = [
        TemplateKind::Website,
        TemplateKind::Portfolio,
        TemplateKind::Ecommerce,
        TemplateKind::LandingPage,
        TemplateKind::Chatbot,
    ];

    /// Case-insensitive lookup by template key (`WEBSITE`, `landingpage`, ...).
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|k| k.key() == key)
    }

    pub fn key(self) -> &'static str {
        match self {
            TemplateKind::Website => "WEBSITE",
            TemplateKind::Portfolio => "PORTFOLIO",
            TemplateKind::Ecommerce => "ECOMMERCE",
            TemplateKind::LandingPage => "LANDINGPAGE",
            TemplateKind::Chatbot => "CHATBOT",
        }
    }

    pub fn html(self) -> &'static str {
        match self {
            TemplateKind::Website => WEBSITE,
            TemplateKind::Portfolio => PORTFOLIO,
            TemplateKind::Ecommerce => ECOMMERCE,
            TemplateKind::LandingPage => LANDINGPAGE,
            TemplateKind::Chatbot => CHATBOT,
        }
    }

    pub fn placeholders(self) -> &'static [Placeholder] {
        match self {
            TemplateKind::Website => &[Placeholder {
                token: "[HEADLINE]",
                prompt: "Generate a compelling, professional headline for a generic business website. Respond with a single string, no quotes.",
                max_tokens: 20,
                fallback: "Build Something Remarkable",
            }],
            TemplateKind::Portfolio => &[
                Placeholder {
                    token: "[NAME]",
                    prompt: "Generate a cool, plausible-sounding full name for a creative professional. Respond with a single string, no quotes.",
                    max_tokens: 10,
                    fallback: "Alex Morgan",
                },
                Placeholder {
                    token: "[TITLE]",
                    prompt: "Generate a cool, specific job title for a creative virtual assistant. Respond with a single string, no quotes.",
                    max_tokens: 15,
                    fallback: "Creative Virtual Assistant",
                },
            ],
            TemplateKind::Ecommerce => &[Placeholder {
                token: "[PROMOTION_HEADLINE]",
                prompt: "Generate a catchy, exciting headline for an e-commerce store's new collection. e.g. 'The Future of Style is Here'. Respond with a single string, no quotes.",
                max_tokens: 20,
                fallback: "The New Collection Has Arrived",
            }],
            TemplateKind::LandingPage => &[Placeholder {
                token: "[LANDINGPAGE_NAME]",
                prompt: "Generate a creative, catchy name for a modern tech and design landing page. e.g. 'The Digital Canvas'. Respond with a single string, no quotes.",
                max_tokens: 15,
                fallback: "The Digital Canvas",
            }],
            TemplateKind::Chatbot => &[Placeholder {
                token: "[ASSISTANT_NAME]",
                prompt: "Generate a friendly, professional name for a helpful website assistant chatbot. e.g. 'SiteGuide'. Respond with a single string, no quotes.",
                max_tokens: 10,
                fallback: "SiteGuide",
            }],
        }
    }
}

/// Replaces every occurrence of each `(token, value)` pair. Values are
/// HTML-escaped since they come straight from a model.
pub fn fill(html: &str, values: &[(&str, String)]) -> String {
    values
        .iter()
        .fold(html.to_string(), |acc, (token, value)| acc.replace(token, &escape_html(value)))
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

const WEBSITE: &str = r##"<!DOCTYPE html>
<html lang="en" class="scroll-smooth">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <script src="https://cdn.tailwindcss.com"></script>
    <title>Your Professional Website</title>
</head>
<body class="bg-slate-950 text-white">
    <nav class="sticky top-0 z-50 border-b border-white/10 bg-slate-950/80 backdrop-blur">
        <div class="container mx-auto flex items-center justify-between px-6 py-4">
            <div id="logo" class="text-xl font-bold">YourLogo</div>
            <ul class="flex gap-8">
                <li><a href="#hero" class="transition-colors hover:text-sky-400">Home</a></li>
                <li><a href="#services" class="transition-colors hover:text-sky-400">Services</a></li>
                <li><a href="#testimonials" class="transition-colors hover:text-sky-400">Clients</a></li>
                <li><a href="#contact" class="transition-colors hover:text-sky-400">Contact</a></li>
            </ul>
        </div>
    </nav>
    <header id="hero" class="container mx-auto px-6 py-28 text-center">
        <h1 id="main-headline" class="text-5xl font-bold leading-tight md:text-7xl">[HEADLINE]</h1>
        <p id="sub-headline" class="mx-auto mt-6 max-w-2xl text-xl text-slate-400">Websites that look sharp, load fast and turn visitors into customers.</p>
        <a id="cta-button" href="#contact" class="mt-10 inline-block rounded-lg bg-sky-500 px-8 py-4 font-semibold transition hover:bg-sky-400 focus:outline-none focus:ring-2 focus:ring-sky-300">Book a Free Consultation</a>
    </header>
    <section id="services" class="bg-slate-900 py-20">
        <div class="container mx-auto grid gap-8 px-6 md:grid-cols-3">
            <article class="rounded-xl bg-slate-950 p-8"><h2 class="mb-3 text-2xl font-bold">Design</h2><p class="text-slate-400">Interfaces people enjoy using.</p></article>
            <article class="rounded-xl bg-slate-950 p-8"><h2 class="mb-3 text-2xl font-bold">Development</h2><p class="text-slate-400">Reliable builds that scale with you.</p></article>
            <article class="rounded-xl bg-slate-950 p-8"><h2 class="mb-3 text-2xl font-bold">Growth</h2><p class="text-slate-400">Search visibility and analytics from day one.</p></article>
        </div>
    </section>
    <section id="testimonials" class="container mx-auto px-6 py-20 text-center">
        <blockquote class="mx-auto max-w-3xl text-2xl italic text-slate-300">"Our inbound leads doubled within a quarter."</blockquote>
        <p class="mt-4 text-sky-400">Jordan Lee, Founder of Northwind</p>
    </section>
    <footer id="contact" class="bg-slate-900 py-10 text-center text-slate-400"><p>&copy; 2025 Your Company. All rights reserved.</p></footer>
</body>
</html>"##;

const PORTFOLIO: &str = r##"<!DOCTYPE html>
<html lang="en" class="scroll-smooth">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <script src="https://cdn.tailwindcss.com"></script>
    <title>Portfolio</title>
</head>
<body class="bg-neutral-950 text-white">
    <section id="hero" class="flex h-screen items-center justify-center bg-gradient-to-br from-neutral-950 to-indigo-950 text-center">
        <div>
            <h1 id="portfolio-name" class="text-6xl font-bold md:text-7xl">[NAME]</h1>
            <p id="portfolio-title" class="mt-3 text-2xl text-indigo-300">[TITLE]</p>
        </div>
    </section>
    <section id="work" class="container mx-auto px-6 py-20">
        <h2 class="mb-12 text-center text-4xl font-bold">Selected Work</h2>
        <div class="grid gap-8 sm:grid-cols-2 lg:grid-cols-3">
            <img src="https://placehold.co/800x600/1e1b4b/ffffff?text=Project+1" alt="Project 1" class="rounded-lg">
            <img src="https://placehold.co/800x600/1e1b4b/ffffff?text=Project+2" alt="Project 2" class="rounded-lg">
            <img src="https://placehold.co/800x600/1e1b4b/ffffff?text=Project+3" alt="Project 3" class="rounded-lg">
        </div>
    </section>
    <section id="about" class="bg-neutral-900 py-20">
        <div class="container mx-auto max-w-3xl px-6 text-center">
            <h2 class="mb-4 text-4xl font-bold">About Me</h2>
            <p id="portfolio-bio" class="text-lg text-neutral-400">I help busy teams ship polished work on time, from brand systems to launch-day landing pages.</p>
        </div>
    </section>
    <footer id="contact" class="py-10 text-center text-neutral-400"><p>Get in touch: <a href="mailto:hello@example.com" class="text-indigo-300">hello@example.com</a></p></footer>
</body>
</html>"##;

const ECOMMERCE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <script src="https://cdn.tailwindcss.com"></script>
    <title>Your Store</title>
</head>
<body class="bg-stone-100 text-stone-800">
    <div class="bg-emerald-700 py-2 text-center text-sm text-white">Free shipping on orders over $50</div>
    <nav class="sticky top-0 z-50 bg-white shadow"><div class="container mx-auto flex items-center justify-between px-6 py-4"><div id="logo" class="text-xl font-bold">YourStore</div><a href="#products" class="hover:text-emerald-700">Shop</a></div></nav>
    <header class="bg-stone-200 py-20 text-center">
        <h1 id="promo-headline" class="text-5xl font-bold">[PROMOTION_HEADLINE]</h1>
        <p class="mt-4 text-stone-600">Fresh arrivals, picked for the season.</p>
        <a href="#products" class="mt-8 inline-block rounded-lg bg-emerald-700 px-8 py-3 font-semibold text-white transition hover:bg-emerald-600">Shop Now</a>
    </header>
    <main id="products" class="container mx-auto grid gap-8 px-6 py-20 sm:grid-cols-2 lg:grid-cols-4">
        <div class="overflow-hidden rounded-lg bg-white shadow"><img src="https://placehold.co/600x400/e7e5e4/44403c?text=Product" alt="Product" class="w-full"><div class="p-6"><h2 class="font-bold">Product Name</h2><p class="mt-2">$49.00</p><button class="mt-4 w-full rounded-lg bg-emerald-700 py-2 text-white transition hover:bg-emerald-600">Add to Cart</button></div></div>
        <div class="overflow-hidden rounded-lg bg-white shadow"><img src="https://placehold.co/600x400/e7e5e4/44403c?text=Product" alt="Product" class="w-full"><div class="p-6"><h2 class="font-bold">Product Name</h2><p class="mt-2">$59.00</p><button class="mt-4 w-full rounded-lg bg-emerald-700 py-2 text-white transition hover:bg-emerald-600">Add to Cart</button></div></div>
    </main>
    <footer class="bg-stone-800 py-10 text-center text-white"><p>&copy; 2025 YourStore. All rights reserved.</p></footer>
</body>
</html>"##;

const LANDINGPAGE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <script src="https://cdn.tailwindcss.com"></script>
    <title>Landing Page</title>
</head>
<body class="bg-white text-zinc-800">
    <header class="border-b py-8 text-center">
        <h1 id="landing-name" class="text-5xl font-bold">[LANDINGPAGE_NAME]</h1>
        <p id="landing-tagline" class="mt-2 text-zinc-500">Ideas, tools and stories for people who build on the web.</p>
    </header>
    <main class="container mx-auto grid gap-12 px-6 py-16 lg:grid-cols-3">
        <article class="lg:col-span-2">
            <img src="https://placehold.co/1200x600/18181b/ffffff?text=Featured" alt="Featured story" class="mb-6 rounded-lg">
            <h2 class="mb-3 text-4xl font-bold">Featured: Designing With AI</h2>
            <p class="text-lg leading-relaxed">A practical look at pairing human taste with machine speed.</p>
        </article>
        <aside class="rounded-lg bg-zinc-100 p-6">
            <h2 class="mb-4 text-xl font-bold">Stay in the loop</h2>
            <form class="flex flex-col gap-3"><input type="email" placeholder="you@example.com" class="rounded border px-3 py-2"><button class="rounded bg-zinc-900 py-2 text-white transition hover:bg-zinc-700">Subscribe</button></form>
        </aside>
    </main>
    <footer class="bg-zinc-900 py-10 text-center text-white"><p>&copy; 2025 Your Landing Page.</p></footer>
</body>
</html>"##;

const CHATBOT: &str = r##"<!DOCTYPE html>
<html lang="en" class="h-full">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <script src="https://cdn.tailwindcss.com"></script>
    <title>Chat Assistant</title>
</head>
<body class="flex h-full items-center justify-center bg-slate-800 p-10">
    <div class="flex h-[70vh] w-full max-w-sm flex-col rounded-2xl border border-white/10 bg-slate-900 shadow-2xl">
        <div class="flex items-center gap-3 rounded-t-2xl bg-gradient-to-r from-violet-600 to-sky-600 p-4">
            <div class="h-12 w-12 rounded-full border-2 border-white/30 bg-white/20"></div>
            <div><h3 id="chatbot-name" class="text-lg font-bold text-white">[ASSISTANT_NAME]</h3><p id="chatbot-status" class="text-xs text-violet-200">Online</p></div>
        </div>
        <div id="chatbot-messages" class="flex-grow space-y-4 overflow-y-auto p-4">
            <div class="flex justify-start"><div class="max-w-xs rounded-2xl rounded-bl-none bg-slate-700 px-4 py-2 text-white">Hello! How can I help you today?</div></div>
        </div>
        <div class="border-t border-white/10 p-4">
            <div class="flex items-center rounded-full bg-slate-700 p-1">
                <input type="text" placeholder="Type a message..." class="flex-grow bg-transparent px-4 text-white focus:outline-none">
                <button class="rounded-full bg-sky-500 px-4 py-2 text-white transition hover:bg-sky-400">Send</button>
            </div>
        </div>
    </div>
</body>
</html>"##;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("website", TemplateKind::Website)]
    #[case("Portfolio", TemplateKind::Portfolio)]
    #[case("ECOMMERCE", TemplateKind::Ecommerce)]
    #[case("landingpage", TemplateKind::LandingPage)]
    #[case(" chatbot ", TemplateKind::Chatbot)]
    fn keys_are_case_insensitive(#[case] key: &str, #[case] expected: TemplateKind) {
        assert_eq!(TemplateKind::from_key(key), Some(expected));
    }

    #[test]
    fn unknown_key_is_none() {
        assert_eq!(TemplateKind::from_key("blog"), None);
    }

    #[test]
    fn every_placeholder_appears_in_its_template() {
        for kind in TemplateKind::ALL {
            assert!(!kind.placeholders().is_empty(), "{kind:?} has no placeholders");
            for p in kind.placeholders() {
                assert!(kind.html().contains(p.token), "{kind:?} is missing {}", p.token);
            }
        }
    }

    #[test]
    fn fill_escapes_model_text() {
        let html = fill("<h1>[HEADLINE]</h1>", &[("[HEADLINE]", "Fast & <Bold>".to_string())]);
        assert_eq!(html, "<h1>Fast &amp; &lt;Bold&gt;</h1>");
    }
}
