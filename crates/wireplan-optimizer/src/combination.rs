//! 替代 BOM 組合列舉

/// 笛卡兒積迭代器（里程錶式遞增，最後一組變化最快）
///
/// 每次產出各組所選的索引；任一組為空時不產出任何組合，
/// 沒有任何組時產出一個空組合。
#[derive(Debug, Clone)]
pub struct Combinations {
    sizes: Vec<usize>,
    current: Option<Vec<usize>>,
}

impl Combinations {
    pub fn new(sizes: Vec<usize>) -> Self {
        let current = if sizes.iter().any(|&s| s == 0) {
            None
        } else {
            Some(vec![0; sizes.len()])
        };
        Self { sizes, current }
    }

    /// 組合總數（溢位時回傳 None）
    pub fn count_of(sizes: &[usize]) -> Option<usize> {
        sizes.iter().try_fold(1usize, |acc, &s| acc.checked_mul(s))
    }
}

impl Iterator for Combinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current.take()?;

        let mut next = current.clone();
        let mut position = next.len();
        let mut advanced = false;
        while position > 0 {
            position -= 1;
            next[position] += 1;
            if next[position] < self.sizes[position] {
                advanced = true;
                break;
            }
            next[position] = 0;
        }
        if advanced {
            self.current = Some(next);
        }

        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_order() {
        let combos: Vec<Vec<usize>> = Combinations::new(vec![2, 3]).collect();
        assert_eq!(combos.len(), 6);
        assert_eq!(combos[0], vec![0, 0]);
        assert_eq!(combos[1], vec![0, 1]);
        assert_eq!(combos[3], vec![1, 0]);
        assert_eq!(combos[5], vec![1, 2]);
    }

    #[test]
    fn test_empty_group_yields_nothing() {
        assert_eq!(Combinations::new(vec![2, 0, 3]).count(), 0);
    }

    #[test]
    fn test_no_groups_yields_single_empty_combination() {
        let combos: Vec<Vec<usize>> = Combinations::new(Vec::new()).collect();
        assert_eq!(combos, vec![Vec::<usize>::new()]);
    }

    #[test]
    fn test_count_of() {
        assert_eq!(Combinations::count_of(&[2, 3, 4]), Some(24));
        assert_eq!(Combinations::count_of(&[]), Some(1));
        assert_eq!(Combinations::count_of(&[usize::MAX, 2]), None);
    }
}
