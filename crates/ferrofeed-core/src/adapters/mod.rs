mod finnhub;
mod reddit;

pub use finnhub::{FinnhubClient, FinnhubCompanyNews, FinnhubMarketNews, FinnhubQuotes};
pub use reddit::RedditPosts;
